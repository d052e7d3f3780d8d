//! Outbound mail through an HTTP relay.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected the message with status {0}")]
    Rejected(u16),
}

#[automock]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Posts each message as JSON to a relay endpoint.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    endpoint: String,
    token: Option<String>,
    http: Client,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self { endpoint: endpoint.into(), token, http: Client::new() }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let mut request = self.http.post(&self.endpoint).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "mail relayed");
        Ok(())
    }
}
