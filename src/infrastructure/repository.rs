//! Persistence seams.
//!
//! Each trait has a Postgres implementation ([`super::postgres::PgStore`]) and
//! an in-memory one ([`super::memory::InMemoryStore`]); which one backs the
//! process is decided once at startup.

use async_trait::async_trait;
use mockall::automock;
use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{DownloadAccess, Order, OrderDraft, OrderPatch, Product};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("stored data is invalid: {0}")]
    Corrupt(String),

    #[error("storage error")]
    Sql(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            _ => Self::Sql(error),
        }
    }
}

#[automock]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Latest state of the entry with this slug, if any. Never cached.
    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError>;
}

#[automock]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new pending order.
    async fn create_order(&self, draft: OrderDraft) -> Result<Order, RepositoryError>;

    /// Applies a partial update and returns the stored result.
    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, RepositoryError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;

    /// Order previously created under a client idempotency key.
    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, RepositoryError>;

    /// All orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError>;
}

#[automock]
#[async_trait]
pub trait DownloadAccessRecorder: Send + Sync {
    async fn record_download_access(&self, entries: Vec<DownloadAccess>) -> Result<(), RepositoryError>;

    /// Access records linked to any of `order_ids`, oldest first.
    async fn download_access_for_orders(&self, order_ids: &[Uuid]) -> Result<Vec<DownloadAccess>, RepositoryError>;
}
