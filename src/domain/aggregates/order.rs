//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::events::{DomainEvent, OrderEvent};

/// Buyer details captured by the checkout form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BuyerContact {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub notes: String,
}

impl BuyerContact {
    /// Trims every field in place.
    pub fn trimmed(mut self) -> Self {
        for field in [&mut self.name, &mut self.email, &mut self.phone, &mut self.document, &mut self.city, &mut self.address, &mut self.notes] {
            *field = field.trim().to_string();
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_slug: String,
    pub title: String,
    /// Unit price actually charged.
    pub price: i64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn subtotal(&self) -> i64 { self.price.saturating_mul(i64::from(self.quantity)) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Paid, Processing, Completed, Cancelled }

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Paid => "paid", Self::Processing => "processing",
            Self::Completed => "completed", Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending), "paid" => Ok(Self::Paid), "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed), "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// What checkout hands to order persistence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderDraft {
    pub buyer: BuyerContact,
    pub items: Vec<OrderItem>,
    pub total: i64,
    pub idempotency_key: Option<Uuid>,
}

impl OrderDraft {
    /// Builds a draft whose total is the sum of its item subtotals.
    pub fn new(buyer: BuyerContact, items: Vec<OrderItem>, idempotency_key: Option<Uuid>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let total = items.iter().map(OrderItem::subtotal).sum();
        Ok(Self { buyer, items, total, idempotency_key })
    }
}

/// Partial update applied by the payment handoff or an administrator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_reference: Option<String>,
    pub payment_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub buyer: BuyerContact,
    pub items: Vec<OrderItem>,
    pub total: i64,
    pub payment_reference: Option<String>,
    pub payment_url: Option<String>,
    pub idempotency_key: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// New pending order from a draft.
    pub fn place(draft: OrderDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), status: OrderStatus::Pending, buyer: draft.buyer, items: draft.items,
            total: draft.total, payment_reference: None, payment_url: None,
            idempotency_key: draft.idempotency_key, created_at: now, updated_at: now,
        }
    }

    /// Applies a patch, returning the events it implies.
    pub fn apply(&mut self, patch: OrderPatch) -> Vec<DomainEvent> {
        let mut events = vec![];
        if let Some(status) = patch.status {
            if status != self.status {
                events.push(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from: self.status, to: status }));
                self.status = status;
            }
        }
        if let Some(reference) = patch.payment_reference {
            events.push(DomainEvent::Order(OrderEvent::PaymentLinked { order_id: self.id, reference: reference.clone() }));
            self.payment_reference = Some(reference);
        }
        if let Some(url) = patch.payment_url { self.payment_url = Some(url); }
        self.touch();
        events
    }

    pub fn item_total(&self) -> i64 { self.items.iter().map(OrderItem::subtotal).sum() }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, UnknownStatus(String) }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::NoItems => write!(f, "No items"), Self::UnknownStatus(s) => write!(f, "Unknown order status: {s}") }
    }
}
