//! Application services
pub mod catalog;
pub mod checkout;
pub mod contact;
pub mod orders;
pub mod rate_limit;

pub use catalog::{CartSummary, CatalogService, DetailedLine};
pub use checkout::{normalize_items, CheckoutError, CheckoutOutcome, CheckoutRequest, CheckoutService, CheckoutSettings};
pub use contact::{ContactError, ContactRequest, ContactService, MailSettings};
pub use orders::{AdminOrder, OrderAdminService};
pub use rate_limit::RateLimiter;
