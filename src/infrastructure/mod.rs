//! Infrastructure layer: storage, payment gateway, mail and event bus.
pub mod cart_storage;
pub mod events;
pub mod mailer;
pub mod memory;
pub mod payments;
pub mod postgres;
pub mod repository;

pub use cart_storage::{FileCartStorage, MemoryCartStorage};
pub use events::EventBus;
pub use mailer::{HttpMailer, MailError, MailMessage, Mailer};
pub use memory::InMemoryStore;
pub use payments::{GatewayError, MercadoPagoConfig, MercadoPagoGateway, PaymentGateway, PaymentPreference, PaymentRedirect};
pub use postgres::PgStore;
pub use repository::{DownloadAccessRecorder, OrderRepository, ProductRepository, RepositoryError};
