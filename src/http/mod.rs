//! HTTP surface: router, shared state, handlers.
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::infrastructure::{
    DownloadAccessRecorder, EventBus, InMemoryStore, Mailer, OrderRepository, PaymentGateway, ProductRepository,
};
use crate::services::{CatalogService, CheckoutService, ContactService, OrderAdminService, RateLimiter};

pub use error::ApiError;

/// Collaborators the services are wired to.
#[derive(Clone)]
pub struct Backends {
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub downloads: Arc<dyn DownloadAccessRecorder>,
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub events: EventBus,
}

impl Backends {
    /// Every storage seam backed by one in-memory store, nothing external.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            products: store.clone(),
            orders: store.clone(),
            downloads: store,
            gateway: None,
            mailer: None,
            events: EventBus::disabled(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub orders: OrderAdminService,
    pub contact: Arc<ContactService>,
}

impl AppState {
    pub fn new(backends: Backends, config: &Config) -> Self {
        let catalog = CatalogService::new(backends.products);
        let checkout = CheckoutService::new(
            catalog.clone(),
            backends.orders.clone(),
            backends.downloads.clone(),
            backends.gateway,
            backends.events.clone(),
            config.checkout_settings(),
        );
        Self {
            catalog,
            checkout,
            orders: OrderAdminService::new(backends.orders, backends.downloads, backends.events),
            contact: Arc::new(ContactService::new(RateLimiter::contact_form(), backends.mailer, config.mail_settings())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/products", get(handlers::product_pricing))
        .route("/api/cart/price", post(handlers::price_cart))
        .route("/api/checkout-cart", post(handlers::checkout_cart))
        .route("/api/checkout", post(handlers::checkout_single))
        .route("/api/contact", post(handlers::contact))
        .route("/api/admin/orders", get(handlers::list_orders).patch(handlers::update_order_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
