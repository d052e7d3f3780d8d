//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod download;

pub use product::{CouponRule, Download, Element, Experience, Listing, Priceable, Product};
pub use order::{BuyerContact, Order, OrderDraft, OrderError, OrderItem, OrderPatch, OrderStatus};
pub use cart::{Cart, CartLine, CartStorage, CartStorageError, CartStore, CART_STORAGE_KEY};
pub use download::{DownloadAccess, DownloadLink};
