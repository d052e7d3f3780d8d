//! Order administration.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{DownloadAccess, Order, OrderPatch, OrderStatus};
use crate::infrastructure::events::EventBus;
use crate::infrastructure::repository::{DownloadAccessRecorder, OrderRepository, RepositoryError};

/// An order as shown to administrators, with the downloads it granted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrder {
    #[serde(flatten)]
    pub order: Order,
    pub download_access: Vec<DownloadAccess>,
}

#[derive(Clone)]
pub struct OrderAdminService {
    orders: Arc<dyn OrderRepository>,
    downloads: Arc<dyn DownloadAccessRecorder>,
    events: EventBus,
}

impl OrderAdminService {
    pub fn new(orders: Arc<dyn OrderRepository>, downloads: Arc<dyn DownloadAccessRecorder>, events: EventBus) -> Self {
        Self { orders, downloads, events }
    }

    /// Every order, newest first.
    pub async fn list(&self) -> Result<Vec<AdminOrder>, RepositoryError> {
        let orders = self.orders.list_orders().await?;
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let mut access: HashMap<Uuid, Vec<DownloadAccess>> = HashMap::new();
        for entry in self.downloads.download_access_for_orders(&ids).await? {
            if let Some(order_id) = entry.order_id {
                access.entry(order_id).or_default().push(entry);
            }
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let download_access = access.remove(&order.id).unwrap_or_default();
                AdminOrder { order, download_access }
            })
            .collect())
    }

    /// Moves an order to `status`. Unknown ids are `NotFound`.
    pub async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, RepositoryError> {
        let mut current = self.orders.get_order(id).await?.ok_or(RepositoryError::NotFound)?;

        let patch = OrderPatch { status: Some(status), ..OrderPatch::default() };
        let events = current.apply(patch.clone());
        let updated = self.orders.update_order(id, patch).await?;

        tracing::info!(order_id = %id, status = status.as_str(), "order status updated");
        self.events.publish_all(&events).await;
        Ok(updated)
    }
}
