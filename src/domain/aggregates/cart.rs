//! Cart Aggregate
//!
//! The browsing client's cart: an ordered set of lines keyed by slug. It has
//! no server-side ownership until checkout, so it is persisted through a
//! [`CartStorage`] surface after every mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage key the cart is persisted under.
pub const CART_STORAGE_KEY: &str = "alma-natura-cart";

/// How long the "added to cart" notice stays up.
pub const ADD_NOTICE_MILLIS: i64 = 2_200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub slug: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

/// Transient "just added" marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddNotice {
    pub slug: String,
    pub shown_at: DateTime<Utc>,
}

impl AddNotice {
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        now >= self.shown_at && now - self.shown_at < Duration::milliseconds(ADD_NOTICE_MILLIS)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
    notice: Option<AddNotice>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds a cart from persisted lines, dropping entries without a slug or
    /// with a zero quantity.
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        Self { lines: lines.into_iter().filter(|l| !l.slug.is_empty() && l.quantity > 0).collect(), notice: None }
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, slug: &str) -> Option<&CartLine> { self.lines.iter().find(|l| l.slug == slug) }
    pub fn total_item_count(&self) -> u64 { self.lines.iter().map(|l| u64::from(l.quantity)).sum() }
    pub fn last_added(&self) -> Option<&str> { self.notice.as_ref().map(|n| n.slug.as_str()) }
    pub fn notice_visible(&self, now: DateTime<Utc>) -> bool { self.notice.as_ref().is_some_and(|n| n.is_visible(now)) }

    /// Adds `quantity` units, merging into an existing line for the same slug.
    /// Restarts the add notice at `now`.
    pub fn add_item(&mut self, slug: &str, quantity: u32, now: DateTime<Utc>) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.slug == slug) {
            existing.quantity = existing.quantity.saturating_add(quantity);
        } else {
            self.lines.push(CartLine { slug: slug.to_string(), quantity, coupon_code: None });
        }
        self.notice = Some(AddNotice { slug: slug.to_string(), shown_at: now });
    }

    pub fn remove_item(&mut self, slug: &str) { self.lines.retain(|l| l.slug != slug); }

    /// Sets the quantity; zero or negative removes the line.
    pub fn update_quantity(&mut self, slug: &str, quantity: i64) {
        if quantity <= 0 { return self.remove_item(slug); }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.lines.iter_mut().find(|l| l.slug == slug) { line.quantity = quantity; }
    }

    /// Stores the code as typed; an empty string clears it. Validity is only
    /// checked when the cart is priced.
    pub fn update_coupon(&mut self, slug: &str, coupon_code: &str) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.slug == slug) {
            line.coupon_code = (!coupon_code.is_empty()).then(|| coupon_code.to_string());
        }
    }

    pub fn clear(&mut self) { self.lines.clear(); }
}

#[derive(Debug, Error)]
pub enum CartStorageError {
    #[error("cart storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cart storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key/value surface the cart is written to.
pub trait CartStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, CartStorageError>;
    fn save(&self, key: &str, value: &str) -> Result<(), CartStorageError>;
}

/// A [`Cart`] bound to its storage. Every mutation is written through.
pub struct CartStore<S: CartStorage> {
    cart: Cart,
    storage: S,
}

impl<S: CartStorage> CartStore<S> {
    /// Loads the persisted cart. Unreadable or malformed data gives an empty
    /// cart instead of an error.
    pub fn open(storage: S) -> Self {
        let cart = match storage.load(CART_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<CartLine>>(&raw) {
                Ok(lines) => Cart::from_lines(lines),
                Err(e) => { tracing::warn!(error = %e, "discarding malformed stored cart"); Cart::new() }
            },
            Ok(None) => Cart::new(),
            Err(e) => { tracing::warn!(error = %e, "cart storage unreadable"); Cart::new() }
        };
        Self { cart, storage }
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn lines(&self) -> &[CartLine] { self.cart.lines() }
    pub fn total_item_count(&self) -> u64 { self.cart.total_item_count() }
    pub fn storage(&self) -> &S { &self.storage }

    pub fn add_item(&mut self, slug: &str, quantity: u32) { self.add_item_at(slug, quantity, Utc::now()); }
    pub fn add_item_at(&mut self, slug: &str, quantity: u32, now: DateTime<Utc>) { self.cart.add_item(slug, quantity, now); self.persist(); }
    pub fn remove_item(&mut self, slug: &str) { self.cart.remove_item(slug); self.persist(); }
    pub fn update_quantity(&mut self, slug: &str, quantity: i64) { self.cart.update_quantity(slug, quantity); self.persist(); }
    pub fn update_coupon(&mut self, slug: &str, coupon_code: &str) { self.cart.update_coupon(slug, coupon_code); self.persist(); }
    pub fn clear(&mut self) { self.cart.clear(); self.persist(); }

    fn persist(&self) {
        let result = serde_json::to_string(self.cart.lines())
            .map_err(|e| CartStorageError::Unavailable(e.to_string()))
            .and_then(|json| self.storage.save(CART_STORAGE_KEY, &json));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist cart");
        }
    }
}
