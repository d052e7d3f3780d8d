//! Storefront domain: catalog, cart, orders and the pricing rules between them.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod value_objects;

pub use pricing::{calculate_pricing, price_listing, PricingResult};
