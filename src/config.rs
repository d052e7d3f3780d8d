//! Environment-based configuration.
//!
//! Values come from the process environment, with a `.env` file loaded first
//! by `main`. Empty variables count as unset.

use thiserror::Error;

use crate::infrastructure::payments::MercadoPagoConfig;
use crate::services::{CheckoutSettings, MailSettings};

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_CURRENCY: &str = "UYU";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_SITE_NAME: &str = "Alma Natura";
pub const DEFAULT_MP_API_BASE: &str = "https://api.mercadopago.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Where catalog and orders live for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { url: String },
    /// Seeded in-memory demo store.
    Memory,
}

#[derive(Debug, Clone, Default)]
pub struct MailConfig {
    pub from: Option<String>,
    pub to: Option<String>,
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageBackend,
    pub nats_url: Option<String>,
    pub payments: Option<MercadoPagoConfig>,
    pub currency: String,
    pub site_url: String,
    pub site_name: String,
    pub mail: MailConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|name| std::env::var(name).ok()) }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let demo_mode = match var("DEMO_MODE").as_deref() {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => return Err(ConfigError::Invalid { name: "DEMO_MODE", value: other.to_string() }),
        };
        let storage = match var("DATABASE_URL") {
            Some(url) if !demo_mode => StorageBackend::Postgres { url },
            _ => StorageBackend::Memory,
        };

        let payments = var("MP_ACCESS_TOKEN").map(|access_token| MercadoPagoConfig {
            access_token,
            api_base: var("MP_API_BASE").unwrap_or_else(|| DEFAULT_MP_API_BASE.to_string()),
        });

        Ok(Self {
            port,
            storage,
            nats_url: var("NATS_URL"),
            payments,
            currency: var("CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            site_url: var("SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            site_name: var("SITE_NAME").unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
            mail: MailConfig {
                from: var("MAIL_FROM"),
                to: var("MAIL_TO"),
                relay_url: var("MAIL_RELAY_URL"),
                relay_token: var("MAIL_RELAY_TOKEN"),
            },
        })
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings { site_url: self.site_url.clone(), currency: self.currency.clone() }
    }

    pub fn mail_settings(&self) -> MailSettings {
        MailSettings {
            from: self.mail.from.clone(),
            to: self.mail.to.clone(),
            site_url: self.site_url.clone(),
            site_name: self.site_name.clone(),
        }
    }
}
