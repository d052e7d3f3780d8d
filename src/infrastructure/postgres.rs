//! Postgres-backed store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::aggregates::{
    BuyerContact, CouponRule, Download, DownloadAccess, Element, Experience, Listing, Order, OrderDraft, OrderItem,
    OrderPatch, Product,
};
use crate::domain::value_objects::{Percent, Slug};

use super::repository::{DownloadAccessRecorder, OrderRepository, ProductRepository, RepositoryError};

const EXPERIENCE_SQL: &str = "SELECT slug, title, summary, details, price, discount_percent, coupons, images FROM experiences WHERE slug = $1";
const ELEMENT_SQL: &str = "SELECT slug, name, description, category, price, discount_percent, coupons, image FROM elements WHERE slug = $1";
const DOWNLOAD_SQL: &str = "SELECT slug, title, description, price, discount_percent, coupons, image, file_url, access FROM downloads WHERE slug = $1";

const INSERT_ORDER_SQL: &str = "INSERT INTO orders (id, status, name, email, phone, document, city, address, notes, total, idempotency_key, created_at, updated_at) \
    VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()) RETURNING *";
const INSERT_ITEM_SQL: &str = "INSERT INTO order_items (order_id, position, product_slug, title, price, quantity) VALUES ($1, $2, $3, $4, $5, $6)";
const UPDATE_ORDER_SQL: &str = "UPDATE orders SET status = COALESCE($2, status), payment_reference = COALESCE($3, payment_reference), \
    payment_url = COALESCE($4, payment_url), updated_at = NOW() WHERE id = $1 RETURNING *";
const ITEMS_FOR_ORDERS_SQL: &str = "SELECT order_id, product_slug, title, price, quantity FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position";
const DOWNLOAD_ACCESS_FOR_ORDERS_SQL: &str = "SELECT order_id, file_slug, email, name FROM download_access WHERE order_id = ANY($1) ORDER BY id";
const INSERT_DOWNLOAD_ACCESS_SQL: &str = "INSERT INTO download_access (order_id, file_slug, email, name, created_at) VALUES ($1, $2, $3, $4, NOW())";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    async fn load_items(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, RepositoryError> {
        let rows = sqlx::query_as::<_, ItemRow>(ITEMS_FOR_ORDERS_SQL).bind(ids).fetch_all(&self.pool).await?;
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            grouped.entry(order_id).or_default().push(OrderItem::try_from(row)?);
        }
        Ok(grouped)
    }

    async fn with_items(&self, row: OrderRow) -> Result<Order, RepositoryError> {
        let items = self.load_items(&[row.id]).await?.remove(&row.id).unwrap_or_default();
        row.into_order(items)
    }
}

#[async_trait]
impl ProductRepository for PgStore {
    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let (experience, element, download) = tokio::try_join!(
            sqlx::query_as::<_, ExperienceRow>(EXPERIENCE_SQL).bind(slug).fetch_optional(&self.pool),
            sqlx::query_as::<_, ElementRow>(ELEMENT_SQL).bind(slug).fetch_optional(&self.pool),
            sqlx::query_as::<_, DownloadRow>(DOWNLOAD_SQL).bind(slug).fetch_optional(&self.pool),
        )?;

        // An experience shadows an element, which shadows a download.
        if let Some(row) = experience { return Product::try_from(row).map(Some); }
        if let Some(row) = element { return Product::try_from(row).map(Some); }
        download.map(Product::try_from).transpose()
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn create_order(&self, draft: OrderDraft) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let buyer = &draft.buyer;
        let row = sqlx::query_as::<_, OrderRow>(INSERT_ORDER_SQL)
            .bind(Uuid::now_v7()).bind(&buyer.name).bind(&buyer.email).bind(&buyer.phone).bind(&buyer.document)
            .bind(&buyer.city).bind(&buyer.address).bind(&buyer.notes).bind(draft.total).bind(draft.idempotency_key)
            .fetch_one(&mut *tx).await?;
        insert_items(&mut tx, row.id, &draft.items).await?;
        tx.commit().await?;
        row.into_order(draft.items)
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(UPDATE_ORDER_SQL)
            .bind(id).bind(patch.status.map(|s| s.as_str())).bind(patch.payment_reference).bind(patch.payment_url)
            .fetch_optional(&self.pool).await?
            .ok_or(RepositoryError::NotFound)?;
        self.with_items(row).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        match row { Some(row) => self.with_items(row).await.map(Some), None => Ok(None) }
    }

    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE idempotency_key = $1").bind(key).fetch_optional(&self.pool).await?;
        match row { Some(row) => self.with_items(row).await.map(Some), None => Ok(None) }
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;
        rows.into_iter().map(|row| { let found = items.remove(&row.id).unwrap_or_default(); row.into_order(found) }).collect()
    }
}

#[async_trait]
impl DownloadAccessRecorder for PgStore {
    async fn record_download_access(&self, entries: Vec<DownloadAccess>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for entry in &entries {
            sqlx::query(INSERT_DOWNLOAD_ACCESS_SQL)
                .bind(entry.order_id).bind(&entry.file_slug).bind(&entry.email).bind(&entry.name)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn download_access_for_orders(&self, order_ids: &[Uuid]) -> Result<Vec<DownloadAccess>, RepositoryError> {
        let rows = sqlx::query_as::<_, DownloadAccessRow>(DOWNLOAD_ACCESS_FOR_ORDERS_SQL).bind(order_ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(DownloadAccess::from).collect())
    }
}

async fn insert_items(tx: &mut Transaction<'_, Postgres>, order_id: Uuid, items: &[OrderItem]) -> Result<(), RepositoryError> {
    for (position, item) in items.iter().enumerate() {
        let quantity = i32::try_from(item.quantity).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let position = i32::try_from(position).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        sqlx::query(INSERT_ITEM_SQL)
            .bind(order_id).bind(position).bind(&item.product_slug).bind(&item.title).bind(item.price).bind(quantity)
            .execute(&mut **tx).await?;
    }
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct ExperienceRow { slug: String, title: String, summary: String, details: String, price: Option<i64>, discount_percent: i32, coupons: Json<serde_json::Value>, images: Json<serde_json::Value> }

#[derive(Debug, sqlx::FromRow)]
struct ElementRow { slug: String, name: String, description: String, category: Option<String>, price: Option<i64>, discount_percent: i32, coupons: Json<serde_json::Value>, image: String }

#[derive(Debug, sqlx::FromRow)]
struct DownloadRow { slug: String, title: String, description: String, price: Option<i64>, discount_percent: i32, coupons: Json<serde_json::Value>, image: String, file_url: String, access: String }

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid, status: String, name: String, email: String, phone: String, document: String, city: String,
    address: String, notes: String, total: i64, payment_reference: Option<String>, payment_url: Option<String>,
    idempotency_key: Option<Uuid>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow { order_id: Uuid, product_slug: String, title: String, price: i64, quantity: i32 }

#[derive(Debug, sqlx::FromRow)]
struct DownloadAccessRow { order_id: Option<Uuid>, file_slug: String, email: Option<String>, name: Option<String> }

impl From<DownloadAccessRow> for DownloadAccess {
    fn from(row: DownloadAccessRow) -> Self {
        Self { file_slug: row.file_slug, email: row.email, name: row.name, order_id: row.order_id }
    }
}

fn listing(slug: String, title: String, description: String, price: Option<i64>, discount: i32, coupons: &serde_json::Value, image: String) -> Result<Listing, RepositoryError> {
    let slug = Slug::new(slug).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
    Ok(Listing {
        slug, title, description, base_price: price,
        discount_percent: Percent::clamped(i64::from(discount)),
        coupons: coupon_rules(coupons), image,
    })
}

/// Anything that is not an array of rule objects counts as "no coupons".
fn coupon_rules(value: &serde_json::Value) -> Vec<CouponRule> {
    value.as_array()
        .map(|rules| rules.iter().filter_map(|r| serde_json::from_value(r.clone()).ok()).collect())
        .unwrap_or_default()
}

impl TryFrom<ExperienceRow> for Product {
    type Error = RepositoryError;
    fn try_from(row: ExperienceRow) -> Result<Self, Self::Error> {
        let image = row.images.0.as_array()
            .and_then(|images| images.first())
            .and_then(|first| first.get("src"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let listing = listing(row.slug, row.title, row.summary.clone(), row.price, row.discount_percent, &row.coupons.0, image)?;
        let details = if row.details.is_empty() { row.summary } else { row.details };
        Ok(Product::Experience(Experience { listing, details }))
    }
}

impl TryFrom<ElementRow> for Product {
    type Error = RepositoryError;
    fn try_from(row: ElementRow) -> Result<Self, Self::Error> {
        let listing = listing(row.slug, row.name, row.description, row.price, row.discount_percent, &row.coupons.0, row.image)?;
        Ok(Product::Element(Element { listing, category: row.category }))
    }
}

impl TryFrom<DownloadRow> for Product {
    type Error = RepositoryError;
    fn try_from(row: DownloadRow) -> Result<Self, Self::Error> {
        let listing = listing(row.slug, row.title, row.description, row.price, row.discount_percent, &row.coupons.0, row.image)?;
        Ok(Product::Download(Download { listing, file_url: row.file_url, access: row.access }))
    }
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = RepositoryError;
    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        Ok(OrderItem { product_slug: row.product_slug, title: row.title, price: row.price, quantity })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let status = self.status.parse().map_err(|e: crate::domain::aggregates::OrderError| RepositoryError::Corrupt(e.to_string()))?;
        Ok(Order {
            id: self.id,
            status,
            buyer: BuyerContact {
                name: self.name, email: self.email, phone: self.phone, document: self.document,
                city: self.city, address: self.address, notes: self.notes,
            },
            items,
            total: self.total,
            payment_reference: self.payment_reference,
            payment_url: self.payment_url,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coupon_rules_from_loose_column() {
        assert!(coupon_rules(&json!({"code": "X"})).is_empty());
        let rules = coupon_rules(&json!([{"code": "AHORRO", "percent": 10, "minQty": 2}, 42, {"code": "LUNA"}]));
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].min_qty(), 2);
        assert!(rules[1].percent().is_zero());
    }

    #[test]
    fn test_experience_row_uses_first_image_and_summary_fallback() {
        let row = ExperienceRow {
            slug: "bano-de-bosque".into(), title: "Baño de bosque".into(), summary: "Resumen".into(), details: String::new(),
            price: Some(1800), discount_percent: 130, coupons: Json(json!([])), images: Json(json!([{"src": "/img/bosque.jpg"}])),
        };
        let Product::Experience(experience) = Product::try_from(row).unwrap() else { panic!("expected an experience") };
        assert_eq!(experience.listing.image, "/img/bosque.jpg");
        assert_eq!(experience.details, "Resumen");
        assert_eq!(experience.listing.discount_percent.value(), 100);
    }
}
