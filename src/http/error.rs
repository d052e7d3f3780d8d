//! Error to response mapping. Every failure is `{ "error": message }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::infrastructure::repository::RepositoryError;
use crate::services::{CheckoutError, ContactError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self { Self { status, message: message.into() } }

    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, message) }

    pub fn not_found(message: impl Into<String>) -> Self { Self::new(StatusCode::NOT_FOUND, message) }

    pub fn internal() -> Self { Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error") }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => Self::not_found("not found"),
            other => {
                tracing::error!(error = ?other, "storage failure");
                Self::internal()
            }
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(error: CheckoutError) -> Self {
        let status = match &error {
            CheckoutError::EmptyCart
            | CheckoutError::InvalidProducts
            | CheckoutError::InvalidItems(_)
            | CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
            CheckoutError::GatewayMisconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            CheckoutError::Gateway(_) | CheckoutError::MissingRedirect => StatusCode::BAD_GATEWAY,
            CheckoutError::Repository(_) => {
                tracing::error!(error = ?error, "checkout storage failure");
                return Self::internal();
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<ContactError> for ApiError {
    fn from(error: ContactError) -> Self {
        let status = match &error {
            ContactError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ContactError::Invalid(_) | ContactError::Honeypot => StatusCode::BAD_REQUEST,
            ContactError::MailNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ContactError::Mail(e) => {
                tracing::error!(error = %e, "contact mail failed");
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, error.to_string())
    }
}
