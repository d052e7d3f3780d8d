//! In-memory store used in demo mode and tests.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::{
    CouponRule, Download, DownloadAccess, Element, Experience, Listing, Order, OrderDraft, OrderPatch, Product,
};
use crate::domain::value_objects::{Slug, SlugError};

use super::repository::{DownloadAccessRecorder, OrderRepository, ProductRepository, RepositoryError};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    products: RwLock<Vec<Product>>,
    orders: RwLock<Vec<Order>>,
    downloads: RwLock<Vec<DownloadAccess>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_products(products: Vec<Product>) -> Self {
        Self { products: RwLock::new(products), ..Self::default() }
    }

    /// Small sample catalog served when no database is configured.
    pub fn demo() -> Result<Self, SlugError> {
        let products = vec![
            Product::Experience(Experience {
                listing: Listing::new(Slug::new("bano-de-bosque")?, "Baño de bosque", Some(1800))
                    .with_description("Guided forest immersion for small groups.")
                    .with_coupon(CouponRule::new("GRUPO", 15, 3)),
                details: String::new(),
            }),
            Product::Experience(Experience {
                listing: Listing::new(Slug::new("sesion-1-a-1")?, "Sesión 1 a 1", Some(2500)).with_discount(10),
                details: String::new(),
            }),
            Product::Element(Element {
                listing: Listing::new(Slug::new("cuenco-de-cuarzo")?, "Cuenco de cuarzo", Some(3200))
                    .with_coupon(CouponRule::new("AHORRO", 10, 2)),
                category: Some("Sonido".into()),
            }),
            Product::Download(Download {
                listing: Listing::new(Slug::new("guia-de-respiracion")?, "Guía de respiración", Some(0)),
                file_url: "/descargas/guia-de-respiracion.pdf".into(),
                access: "Gratis".into(),
            }),
            Product::Download(Download {
                listing: Listing::new(Slug::new("cuaderno-de-estaciones")?, "Cuaderno de estaciones", Some(120)),
                file_url: "/descargas/cuaderno-de-estaciones.pdf".into(),
                access: "Pago".into(),
            }),
        ];
        Ok(Self::with_products(products))
    }

    /// Replaces or inserts a catalog entry.
    pub async fn upsert_product(&self, product: Product) {
        let mut products = self.products.write().await;
        match products.iter_mut().find(|p| p.slug() == product.slug()) {
            Some(existing) => *existing = product,
            None => products.push(product),
        }
    }

    pub async fn download_access(&self) -> Vec<DownloadAccess> { self.downloads.read().await.clone() }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.iter().find(|p| p.slug().as_str() == slug).cloned())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn create_order(&self, draft: OrderDraft) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        if let Some(key) = draft.idempotency_key {
            if orders.iter().any(|o| o.idempotency_key == Some(key)) {
                return Err(RepositoryError::AlreadyExists);
            }
        }
        let order = Order::place(draft);
        orders.push(order.clone());
        Ok(order)
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders.iter_mut().find(|o| o.id == id).ok_or(RepositoryError::NotFound)?;
        order.apply(patch);
        Ok(order.clone())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.iter().find(|o| o.idempotency_key == Some(key)).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.orders.read().await.iter().rev().cloned().collect())
    }
}

#[async_trait]
impl DownloadAccessRecorder for InMemoryStore {
    async fn record_download_access(&self, entries: Vec<DownloadAccess>) -> Result<(), RepositoryError> {
        self.downloads.write().await.extend(entries);
        Ok(())
    }

    async fn download_access_for_orders(&self, order_ids: &[Uuid]) -> Result<Vec<DownloadAccess>, RepositoryError> {
        let downloads = self.downloads.read().await;
        Ok(downloads.iter().filter(|d| d.order_id.is_some_and(|id| order_ids.contains(&id))).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{BuyerContact, OrderItem, OrderStatus};
    use testresult::TestResult;

    fn draft(key: Option<Uuid>) -> OrderDraft {
        let item = OrderItem { product_slug: "cuenco-de-cuarzo".into(), title: "Cuenco".into(), price: 3200, quantity: 1 };
        OrderDraft::new(BuyerContact::default(), vec![item], key).unwrap()
    }

    #[tokio::test]
    async fn demo_catalog_resolves_by_slug() -> TestResult {
        let store = InMemoryStore::demo()?;
        let product = store.get_product_by_slug("cuenco-de-cuarzo").await?;
        assert_eq!(product.map(|p| p.title().to_string()).as_deref(), Some("Cuenco de cuarzo"));
        assert!(store.get_product_by_slug("missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn orders_round_trip_and_list_newest_first() -> TestResult {
        let store = InMemoryStore::new();
        let first = store.create_order(draft(None)).await?;
        let second = store.create_order(draft(None)).await?;

        let updated = store.update_order(first.id, OrderPatch { status: Some(OrderStatus::Paid), ..Default::default() }).await?;
        assert_eq!(updated.status, OrderStatus::Paid);

        let listed: Vec<Uuid> = store.list_orders().await?.into_iter().map(|o| o.id).collect();
        assert_eq!(listed, vec![second.id, first.id]);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() -> TestResult {
        let store = InMemoryStore::new();
        let key = Uuid::now_v7();
        let order = store.create_order(draft(Some(key))).await?;
        assert!(matches!(store.create_order(draft(Some(key))).await, Err(RepositoryError::AlreadyExists)));
        assert_eq!(store.find_by_idempotency_key(key).await?.map(|o| o.id), Some(order.id));
        Ok(())
    }

    #[tokio::test]
    async fn download_access_filters_by_order() -> TestResult {
        let store = InMemoryStore::new();
        let order = Uuid::now_v7();
        let access = |slug: &str, order_id| DownloadAccess { file_slug: slug.into(), email: None, name: None, order_id };
        store
            .record_download_access(vec![access("guia", Some(order)), access("mapa", None), access("cuaderno", Some(Uuid::now_v7()))])
            .await?;

        let found = store.download_access_for_orders(&[order]).await?;
        assert_eq!(found, vec![access("guia", Some(order))]);
        assert!(store.download_access_for_orders(&[]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn update_unknown_order_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.update_order(Uuid::now_v7(), OrderPatch::default()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)), "expected NotFound, got {result:?}");
    }
}
