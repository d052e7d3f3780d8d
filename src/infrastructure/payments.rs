//! Payment gateway handoff.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Line handed to the gateway, priced server-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub currency_id: String,
    pub unit_price: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Payer {
    pub name: String,
    pub email: String,
    pub phone: PayerPhone,
    pub identification: PayerIdentification,
    pub address: PayerAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayerPhone { pub number: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayerIdentification {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayerAddress { pub street_name: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReturnUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

impl ReturnUrls {
    /// `{base}?status=success|failure|pending`.
    pub fn under(base: &str) -> Self {
        Self {
            success: format!("{base}?status=success"),
            failure: format!("{base}?status=failure"),
            pending: format!("{base}?status=pending"),
        }
    }
}

/// Checkout preference request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentPreference {
    pub items: Vec<PreferenceItem>,
    pub payer: Payer,
    pub metadata: serde_json::Value,
    pub external_reference: String,
    pub back_urls: ReturnUrls,
    pub auto_return: String,
}

/// What the gateway hands back: its reference and where to send the buyer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentRedirect {
    pub id: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected the preference with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_preference(&self, preference: PaymentPreference) -> Result<PaymentRedirect, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    /// e.g. `"https://api.mercadopago.com"`.
    pub api_base: String,
}

/// Checkout Pro client.
#[derive(Debug, Clone)]
pub struct MercadoPagoGateway {
    config: MercadoPagoConfig,
    http: Client,
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> Self { Self { config, http: Client::new() } }
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: Option<String>,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_payment_preference(&self, preference: PaymentPreference) -> Result<PaymentRedirect, GatewayError> {
        let url = format!("{}/checkout/preferences", self.config.api_base.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&preference)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status, body });
        }

        let parsed: PreferenceResponse = response.json().await?;
        tracing::debug!(preference_id = ?parsed.id, "payment preference created");

        Ok(PaymentRedirect {
            id: parsed.id,
            redirect_url: parsed.init_point.or(parsed.sandbox_init_point).filter(|u| !u.is_empty()),
        })
    }
}
