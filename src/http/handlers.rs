use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::{BuyerContact, CartLine, Order, OrderError, OrderStatus, Product};
use crate::infrastructure::RepositoryError;
use crate::services::{AdminOrder, CartSummary, CheckoutOutcome, CheckoutRequest, ContactRequest};

use super::{ApiError, AppState};

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "alma-store" }))
}

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub slugs: Option<String>,
}

pub async fn product_pricing(
    State(s): State<AppState>,
    Query(q): Query<ProductsQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let slugs = q.slugs.filter(|s| !s.is_empty()).ok_or_else(|| ApiError::bad_request("missing slugs"))?;
    Ok(Json(s.catalog.pricing_inputs(&slugs).await?))
}

pub async fn price_cart(State(s): State<AppState>, Json(lines): Json<Vec<CartLine>>) -> Result<Json<CartSummary>, ApiError> {
    Ok(Json(s.catalog.price_cart(&lines).await?))
}

/// Buyer fields shared by both checkout forms.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuyerForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub document: String,
    pub city: String,
    pub address: String,
    pub notes: String,
}

impl From<BuyerForm> for BuyerContact {
    fn from(f: BuyerForm) -> Self {
        Self { name: f.name, email: f.email, phone: f.phone, document: f.document, city: f.city, address: f.address, notes: f.notes }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutCartForm {
    pub items: Option<String>,
    pub idempotency_key: Option<String>,
    #[serde(flatten)]
    pub buyer: BuyerForm,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub slug: String,
    pub coupon: String,
    pub idempotency_key: Option<String>,
    #[serde(flatten)]
    pub buyer: BuyerForm,
}

fn idempotency_key(raw: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => Uuid::parse_str(key).map(Some).map_err(|_| ApiError::bad_request("invalid idempotency key")),
        None => Ok(None),
    }
}

fn checkout_response(outcome: CheckoutOutcome) -> Response {
    match outcome {
        CheckoutOutcome::Redirect { url, .. } => Redirect::to(&url).into_response(),
        downloads @ CheckoutOutcome::Downloads { .. } => Json(downloads).into_response(),
    }
}

pub async fn checkout_cart(State(s): State<AppState>, Form(form): Form<CheckoutCartForm>) -> Result<Response, ApiError> {
    let request = CheckoutRequest {
        items: form.items.unwrap_or_else(|| "[]".to_string()),
        idempotency_key: idempotency_key(form.idempotency_key.as_deref())?,
        buyer: form.buyer.into(),
    };
    Ok(checkout_response(s.checkout.checkout_cart(request).await?))
}

pub async fn checkout_single(State(s): State<AppState>, Form(form): Form<CheckoutForm>) -> Result<Response, ApiError> {
    let key = idempotency_key(form.idempotency_key.as_deref())?;
    let outcome = s.checkout.checkout_single(&form.slug, &form.coupon, form.buyer.into(), key).await?;
    Ok(checkout_response(outcome))
}

/// First `x-forwarded-for` hop, else `x-real-ip`, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    ["x-forwarded-for", "x-real-ip"]
        .into_iter()
        .filter_map(|name| headers.get(name).and_then(|v| v.to_str().ok()))
        .find(|v| !v.is_empty())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn contact(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ContactRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    s.contact.submit(&client_ip(&headers), request, Utc::now()).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn list_orders(State(s): State<AppState>) -> Result<Json<Vec<AdminOrder>>, ApiError> {
    Ok(Json(s.orders.list().await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub id: Option<Uuid>,
    pub status: Option<String>,
}

pub async fn update_order_status(State(s): State<AppState>, Json(update): Json<StatusUpdate>) -> Result<Json<Order>, ApiError> {
    let (Some(id), Some(status)) = (update.id, update.status.filter(|s| !s.is_empty())) else {
        return Err(ApiError::bad_request("id and status required"));
    };
    let status: OrderStatus = status.parse().map_err(|e: OrderError| ApiError::bad_request(e.to_string()))?;

    s.orders.update_status(id, status).await.map(Json).map_err(|e| match e {
        RepositoryError::NotFound => ApiError::not_found("order not found"),
        other => other.into(),
    })
}
