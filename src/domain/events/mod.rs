//! Domain events
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::order::OrderStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
}

impl DomainEvent {
    /// Subject suffix the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Created { .. }) => "orders.created",
            Self::Order(OrderEvent::PaymentLinked { .. }) => "orders.payment_linked",
            Self::Order(OrderEvent::DownloadsGranted { .. }) => "orders.downloads_granted",
            Self::Order(OrderEvent::StatusChanged { .. }) => "orders.status_changed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, total: i64 },
    PaymentLinked { order_id: Uuid, reference: String },
    DownloadsGranted { order_id: Uuid, slugs: Vec<String> },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}
