//! Alma Store
//!
//! Storefront backend for nature-based experiences, physical elements and
//! downloadable guides.
//!
//! ## Features
//! - Coupon and standing-discount pricing engine
//! - Client cart state with durable local storage
//! - Server-side checkout reconciliation and payment handoff
//! - Direct download delivery for zero-total orders
//! - Order administration and contact form relay

pub mod config;
pub mod domain;
pub mod http;
pub mod infrastructure;
pub mod services;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{Config, StorageBackend};
use crate::domain::value_objects::SlugError;
use crate::http::{AppState, Backends};
use crate::infrastructure::{
    EventBus, HttpMailer, InMemoryStore, Mailer, MercadoPagoGateway, PaymentGateway, PgStore,
};

/// NATS subject prefix for published domain events.
pub const EVENT_SUBJECT_PREFIX: &str = "store";

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("demo catalog error: {0}")]
    DemoCatalog(#[from] SlugError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Connects every collaborator named by `config` and assembles the services.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let mut backends = match &config.storage {
        StorageBackend::Postgres { url } => {
            let store = Arc::new(PgStore::connect(url).await?);
            tracing::info!("using postgres storage");
            Backends {
                products: store.clone(),
                orders: store.clone(),
                downloads: store,
                gateway: None,
                mailer: None,
                events: EventBus::disabled(),
            }
        }
        StorageBackend::Memory => {
            tracing::info!("no database configured, serving the demo catalog from memory");
            Backends::in_memory(Arc::new(InMemoryStore::demo()?))
        }
    };

    backends.gateway = config
        .payments
        .clone()
        .map(|mp| Arc::new(MercadoPagoGateway::new(mp)) as Arc<dyn PaymentGateway>);
    if backends.gateway.is_none() {
        tracing::warn!("MP_ACCESS_TOKEN not set, paid checkouts will be refused");
    }

    backends.mailer = config
        .mail
        .relay_url
        .clone()
        .map(|url| Arc::new(HttpMailer::new(url, config.mail.relay_token.clone())) as Arc<dyn Mailer>);

    backends.events = connect_events(config.nats_url.as_deref()).await;

    Ok(AppState::new(backends, config))
}

/// NATS is optional: a failed connection disables publishing.
async fn connect_events(url: Option<&str>) -> EventBus {
    let Some(url) = url else { return EventBus::disabled() };
    match async_nats::connect(url).await {
        Ok(client) => {
            tracing::info!(%url, "connected to NATS");
            EventBus::new(Some(client), EVENT_SUBJECT_PREFIX)
        }
        Err(e) => {
            tracing::warn!(error = %e, %url, "NATS unavailable, events disabled");
            EventBus::disabled()
        }
    }
}
