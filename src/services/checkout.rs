//! Checkout reconciliation.
//!
//! Re-derives every price from the live catalog, persists a pending order and
//! either hands the buyer to the payment gateway or, when nothing is owed,
//! grants the downloads directly.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::domain::aggregates::{
    BuyerContact, CartLine, DownloadAccess, DownloadLink, Order, OrderDraft, OrderItem, OrderPatch, Product,
};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Quantity, MAX_LINE_QUANTITY};
use crate::infrastructure::events::EventBus;
use crate::infrastructure::payments::{
    GatewayError, Payer, PayerAddress, PayerIdentification, PayerPhone, PaymentGateway, PaymentPreference,
    PreferenceItem, ReturnUrls,
};
use crate::infrastructure::repository::{DownloadAccessRecorder, OrderRepository, RepositoryError};

use super::catalog::CatalogService;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("product invalid or unpriced")]
    InvalidProducts,

    #[error("invalid items")]
    InvalidItems(#[source] serde_json::Error),

    #[error("invalid buyer details")]
    Validation(#[from] ValidationErrors),

    #[error("payment gateway misconfigured")]
    GatewayMisconfigured,

    #[error("payment gateway unavailable")]
    Gateway(#[from] GatewayError),

    #[error("could not create checkout")]
    MissingRedirect,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    /// Public origin the gateway returns buyers to, without trailing slash.
    pub site_url: String,
    pub currency: String,
}

/// Cart checkout as submitted by the checkout form.
#[derive(Clone, Debug, Default)]
pub struct CheckoutRequest {
    /// JSON array of `{slug, quantity, couponCode?}`, unparsed.
    pub items: String,
    pub buyer: BuyerContact,
    pub idempotency_key: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// Send the buyer to the gateway.
    Redirect { order_id: Uuid, url: String },
    /// Nothing to pay; show the links.
    Downloads { order_id: Uuid, links: Vec<DownloadLink> },
}

impl CheckoutOutcome {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Redirect { order_id, .. } | Self::Downloads { order_id, .. } => *order_id,
        }
    }
}

/// Parses the submitted items and folds them into one line per slug.
///
/// Entries without a slug or with a non-numeric quantity are skipped.
/// Quantities are floored and clamped into `[1, MAX_LINE_QUANTITY]`, repeated
/// slugs are summed under the same cap, and the last non-empty coupon code
/// for a slug wins. Anything other than a JSON array yields no lines.
pub fn normalize_items(raw: &str) -> Result<Vec<CartLine>, CheckoutError> {
    let parsed: Value = serde_json::from_str(raw).map_err(CheckoutError::InvalidItems)?;
    let Value::Array(entries) = parsed else { return Ok(vec![]) };

    let mut lines: Vec<CartLine> = vec![];
    for entry in &entries {
        let slug = text_field(entry.get("slug"));
        let Some(quantity) = quantity_field(entry.get("quantity")) else { continue };
        if slug.is_empty() {
            continue;
        }

        let quantity = Quantity::capped(quantity.floor() as i64).value();
        let coupon = text_field(entry.get("couponCode"));

        match lines.iter().position(|l| l.slug == slug) {
            Some(index) => {
                let line = &mut lines[index];
                line.quantity = (line.quantity + quantity).min(MAX_LINE_QUANTITY);
                if !coupon.is_empty() {
                    line.coupon_code = Some(coupon);
                }
            }
            None => lines.push(CartLine { slug, quantity, coupon_code: (!coupon.is_empty()).then_some(coupon) }),
        }
    }

    Ok(lines)
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Numeric reading of a submitted quantity; absent counts as zero and
/// `None` means "not a number".
fn quantity_field(value: Option<&Value>) -> Option<f64> {
    let number = match value {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    number.filter(|n| n.is_finite())
}

/// Return target and request-specific metadata for one handoff.
struct Handoff {
    return_base: String,
    extra: Value,
}

#[derive(Clone)]
pub struct CheckoutService {
    catalog: CatalogService,
    orders: Arc<dyn OrderRepository>,
    downloads: Arc<dyn DownloadAccessRecorder>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    events: EventBus,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        catalog: CatalogService,
        orders: Arc<dyn OrderRepository>,
        downloads: Arc<dyn DownloadAccessRecorder>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        events: EventBus,
        settings: CheckoutSettings,
    ) -> Self {
        Self { catalog, orders, downloads, gateway, events, settings }
    }

    /// Checks out a whole cart.
    #[tracing::instrument(skip_all, fields(idempotency_key = ?request.idempotency_key))]
    pub async fn checkout_cart(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        let lines = normalize_items(&request.items)?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let buyer = validated(request.buyer)?;

        let handoff = Handoff {
            return_base: format!("{}/checkout", self.site_url()),
            extra: json!({ "items": lines }),
        };
        self.reconcile(lines, buyer, request.idempotency_key, handoff).await
    }

    /// "Buy now" for a single product: one unit, return URLs scoped to it.
    #[tracing::instrument(skip(self, buyer))]
    pub async fn checkout_single(
        &self,
        slug: &str,
        coupon: &str,
        buyer: BuyerContact,
        idempotency_key: Option<Uuid>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(CheckoutError::InvalidProducts);
        }
        let buyer = validated(buyer)?;
        let coupon = coupon.trim();

        let line = CartLine {
            slug: slug.to_string(),
            quantity: 1,
            coupon_code: (!coupon.is_empty()).then(|| coupon.to_string()),
        };
        let handoff = Handoff {
            return_base: format!("{}/checkout/{slug}", self.site_url()),
            extra: json!({ "product": slug, "coupon": coupon }),
        };
        self.reconcile(vec![line], buyer, idempotency_key, handoff).await
    }

    async fn reconcile(
        &self,
        lines: Vec<CartLine>,
        buyer: BuyerContact,
        idempotency_key: Option<Uuid>,
        handoff: Handoff,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.orders.find_by_idempotency_key(key).await? {
                return self.resume(existing, &handoff).await;
            }
        }

        let summary = self.catalog.price_cart(&lines).await?;
        if summary.lines.is_empty() || summary.total < 0 {
            return Err(CheckoutError::InvalidProducts);
        }
        if summary.total > 0 && self.gateway.is_none() {
            return Err(CheckoutError::GatewayMisconfigured);
        }

        let items = summary
            .lines
            .iter()
            .map(|d| OrderItem {
                product_slug: d.line.slug.clone(),
                title: d.product.title().to_string(),
                price: d.pricing.unit_price,
                quantity: d.line.quantity,
            })
            .collect();
        let draft = OrderDraft::new(buyer, items, idempotency_key).map_err(|_| CheckoutError::EmptyCart)?;

        let order = match (self.orders.create_order(draft).await, idempotency_key) {
            (Ok(order), _) => order,
            // Lost a race against a concurrent submit with the same key.
            (Err(RepositoryError::AlreadyExists), Some(key)) => {
                let existing = self.orders.find_by_idempotency_key(key).await?.ok_or(RepositoryError::NotFound)?;
                return self.resume(existing, &handoff).await;
            }
            (Err(e), _) => return Err(e.into()),
        };

        tracing::info!(order_id = %order.id, total = order.total, "order created");
        self.events.publish(&DomainEvent::Order(OrderEvent::Created { order_id: order.id, total: order.total })).await;

        if order.total == 0 {
            let products: Vec<Product> = summary.lines.into_iter().map(|d| d.product).collect();
            self.grant_downloads(&order, &products).await
        } else {
            self.hand_off(order, &handoff).await
        }
    }

    /// Outcome for an order created by an earlier submit with the same key.
    async fn resume(&self, order: Order, handoff: &Handoff) -> Result<CheckoutOutcome, CheckoutError> {
        tracing::info!(order_id = %order.id, "replaying earlier checkout");

        if let Some(url) = order.payment_url.clone() {
            return Ok(CheckoutOutcome::Redirect { order_id: order.id, url });
        }
        if order.total != 0 {
            // Earlier handoff never produced a redirect; try again for the same order.
            return self.hand_off(order, handoff).await;
        }

        let mut products = Vec::with_capacity(order.items.len());
        for item in &order.items {
            if let Some(product) = self.catalog.product(&item.product_slug).await? {
                products.push(product);
            }
        }
        Ok(CheckoutOutcome::Downloads { order_id: order.id, links: download_links(&products) })
    }

    async fn hand_off(&self, mut order: Order, handoff: &Handoff) -> Result<CheckoutOutcome, CheckoutError> {
        let gateway = self.gateway.as_ref().ok_or(CheckoutError::GatewayMisconfigured)?;

        let preference = PaymentPreference {
            items: order
                .items
                .iter()
                .map(|item| PreferenceItem {
                    id: item.product_slug.clone(),
                    title: item.title.clone(),
                    quantity: item.quantity,
                    currency_id: self.settings.currency.clone(),
                    unit_price: item.price,
                })
                .collect(),
            payer: payer(&order.buyer),
            metadata: metadata(&order.buyer, &handoff.extra),
            external_reference: order.id.to_string(),
            back_urls: ReturnUrls::under(&handoff.return_base),
            auto_return: "approved".to_string(),
        };

        let redirect = gateway.create_payment_preference(preference).await.map_err(|e| {
            tracing::warn!(order_id = %order.id, error = %e, "payment handoff failed, order left pending");
            CheckoutError::Gateway(e)
        })?;

        if redirect.id.is_some() || redirect.redirect_url.is_some() {
            let patch = OrderPatch {
                status: None,
                payment_reference: redirect.id.clone(),
                payment_url: redirect.redirect_url.clone(),
            };
            let events = order.apply(patch.clone());
            self.orders.update_order(order.id, patch).await?;
            self.events.publish_all(&events).await;
        }

        match redirect.redirect_url {
            Some(url) => Ok(CheckoutOutcome::Redirect { order_id: order.id, url }),
            None => {
                tracing::warn!(order_id = %order.id, "gateway returned no redirect");
                Err(CheckoutError::MissingRedirect)
            }
        }
    }

    async fn grant_downloads(&self, order: &Order, products: &[Product]) -> Result<CheckoutOutcome, CheckoutError> {
        let links = download_links(products);

        let entries: Vec<DownloadAccess> = links
            .iter()
            .map(|link| DownloadAccess {
                file_slug: link.slug.clone(),
                email: non_empty(&order.buyer.email),
                name: non_empty(&order.buyer.name),
                order_id: Some(order.id),
            })
            .collect();

        if !entries.is_empty() {
            self.downloads.record_download_access(entries).await?;
            let slugs = links.iter().map(|l| l.slug.clone()).collect();
            self.events.publish(&DomainEvent::Order(OrderEvent::DownloadsGranted { order_id: order.id, slugs })).await;
        }

        tracing::info!(order_id = %order.id, downloads = links.len(), "zero-total checkout completed");
        Ok(CheckoutOutcome::Downloads { order_id: order.id, links })
    }

    fn site_url(&self) -> &str { self.settings.site_url.trim_end_matches('/') }
}

fn validated(buyer: BuyerContact) -> Result<BuyerContact, CheckoutError> {
    let buyer = buyer.trimmed();
    buyer.validate()?;
    Ok(buyer)
}

fn download_links(products: &[Product]) -> Vec<DownloadLink> {
    products
        .iter()
        .filter_map(|p| {
            p.file_url().map(|url| DownloadLink {
                slug: p.slug().to_string(),
                title: p.title().to_string(),
                file_url: url.to_string(),
            })
        })
        .collect()
}

fn payer(buyer: &BuyerContact) -> Payer {
    Payer {
        name: buyer.name.clone(),
        email: buyer.email.clone(),
        phone: PayerPhone { number: buyer.phone.clone() },
        identification: PayerIdentification { kind: "CI".to_string(), number: buyer.document.clone() },
        address: PayerAddress { street_name: buyer.address.clone() },
    }
}

fn metadata(buyer: &BuyerContact, extra: &Value) -> Value {
    let mut meta = json!({
        "name": buyer.name,
        "email": buyer.email,
        "phone": buyer.phone,
        "document": buyer.document,
        "city": buyer.city,
        "address": buyer.address,
        "notes": buyer.notes,
    });
    if let (Some(meta), Some(extra)) = (meta.as_object_mut(), extra.as_object()) {
        meta.extend(extra.clone());
    }
    meta
}

fn non_empty(value: &str) -> Option<String> { (!value.is_empty()).then(|| value.to_string()) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Download, Listing, OrderStatus};
    use crate::domain::value_objects::Slug;
    use crate::infrastructure::memory::InMemoryStore;
    use crate::infrastructure::payments::{MockPaymentGateway, PaymentRedirect};
    use crate::infrastructure::repository::ProductRepository;
    use testresult::TestResult;

    fn buyer() -> BuyerContact {
        BuyerContact { name: " Ana ".into(), email: "ana@example.com".into(), document: "1234567-8".into(), ..Default::default() }
    }

    fn settings() -> CheckoutSettings {
        CheckoutSettings { site_url: "https://almanatura.uy/".into(), currency: "UYU".into() }
    }

    fn service(store: &Arc<InMemoryStore>, gateway: Option<MockPaymentGateway>) -> CheckoutService {
        CheckoutService::new(
            CatalogService::new(store.clone()),
            store.clone(),
            store.clone(),
            gateway.map(|g| Arc::new(g) as Arc<dyn PaymentGateway>),
            EventBus::disabled(),
            settings(),
        )
    }

    fn redirecting_gateway(times: usize) -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_payment_preference().times(times).returning(|p| {
            Ok(PaymentRedirect {
                id: Some(format!("pref-{}", p.external_reference)),
                redirect_url: Some(format!("https://pay.example/{}", p.external_reference)),
            })
        });
        gateway
    }

    fn cart(items: &str) -> CheckoutRequest {
        CheckoutRequest { items: items.into(), buyer: buyer(), idempotency_key: None }
    }

    #[test]
    fn test_normalize_merges_repeated_slugs() -> TestResult {
        let lines = normalize_items(r#"[{"slug":"a","quantity":2},{"slug":"a","quantity":3}]"#)?;
        assert_eq!(lines, vec![CartLine { slug: "a".into(), quantity: 5, coupon_code: None }]);

        let lines = normalize_items(r#"[{"slug":"a","quantity":20},{"slug":"a","quantity":10}]"#)?;
        assert_eq!(lines[0].quantity, MAX_LINE_QUANTITY);
        Ok(())
    }

    #[test]
    fn test_normalize_clamps_floors_and_skips() -> TestResult {
        let lines = normalize_items(
            r#"[
                {"slug":" b ","quantity":2.7},
                {"slug":"c","quantity":-4},
                {"slug":"d","quantity":"abc"},
                {"slug":"","quantity":1},
                {"quantity":1},
                {"slug":"e","quantity":99},
                {"slug":"f"}
            ]"#,
        )?;
        let got: Vec<(&str, u32)> = lines.iter().map(|l| (l.slug.as_str(), l.quantity)).collect();
        assert_eq!(got, vec![("b", 2), ("c", 1), ("e", 25), ("f", 1)]);
        Ok(())
    }

    #[test]
    fn test_normalize_keeps_last_non_empty_coupon() -> TestResult {
        let lines = normalize_items(
            r#"[{"slug":"a","quantity":1,"couponCode":"uno"},{"slug":"a","quantity":1,"couponCode":"dos"},{"slug":"a","quantity":1,"couponCode":"  "}]"#,
        )?;
        assert_eq!(lines[0].coupon_code.as_deref(), Some("dos"));
        assert_eq!(lines[0].quantity, 3);
        Ok(())
    }

    #[test]
    fn test_normalize_rejects_malformed_json_and_ignores_non_arrays() -> TestResult {
        assert!(matches!(normalize_items("[{"), Err(CheckoutError::InvalidItems(_))));
        assert!(normalize_items(r#"{"slug":"a"}"#)?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_paid_checkout_redirects_and_links_payment() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment_preference()
            .withf(|p| {
                p.items.len() == 1
                    && p.items[0].id == "cuenco-de-cuarzo"
                    && p.items[0].unit_price == 2880
                    && p.items[0].quantity == 2
                    && p.items[0].currency_id == "UYU"
                    && p.payer.identification.kind == "CI"
                    && p.payer.name == "Ana"
                    && p.back_urls.success == "https://almanatura.uy/checkout?status=success"
                    && p.auto_return == "approved"
                    && p.metadata["items"][0]["couponCode"] == "ahorro"
            })
            .times(1)
            .returning(|p| {
                Ok(PaymentRedirect { id: Some("pref-1".into()), redirect_url: Some(format!("https://pay.example/{}", p.external_reference)) })
            });

        let outcome = service(&store, Some(gateway))
            .checkout_cart(cart(r#"[{"slug":"cuenco-de-cuarzo","quantity":2,"couponCode":"ahorro"}]"#))
            .await?;

        let CheckoutOutcome::Redirect { order_id, url } = outcome else { panic!("expected redirect") };
        assert_eq!(url, format!("https://pay.example/{order_id}"));

        let order = store.get_order(order_id).await?.ok_or("order missing")?;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, 5760);
        assert_eq!(order.buyer.name, "Ana");
        assert_eq!(order.payment_reference.as_deref(), Some("pref-1"));
        assert_eq!(order.payment_url.as_deref(), Some(url.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_total_grants_downloads_without_gateway() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        store
            .upsert_product(Product::Download(Download {
                listing: Listing::new(Slug::new("mapa-sonoro")?, "Mapa sonoro", Some(450)).with_discount(100),
                file_url: "/descargas/mapa-sonoro.pdf".into(),
                access: "Pago".into(),
            }))
            .await;

        let outcome = service(&store, None)
            .checkout_cart(cart(r#"[{"slug":"mapa-sonoro","quantity":1},{"slug":"guia-de-respiracion","quantity":1}]"#))
            .await?;

        let CheckoutOutcome::Downloads { order_id, links } = outcome else { panic!("expected downloads") };
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].file_url, "/descargas/mapa-sonoro.pdf");

        let access = store.download_access().await;
        assert_eq!(access.len(), 2);
        assert!(access.iter().all(|a| a.order_id == Some(order_id) && a.email.as_deref() == Some("ana@example.com")));

        let order = store.get_order(order_id).await?.ok_or("order missing")?;
        assert_eq!(order.total, 0);
        assert_eq!(order.status, OrderStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_price_cannot_offset_paid_lines() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        store
            .upsert_product(Product::Download(Download {
                listing: Listing::new(Slug::new("raro")?, "Raro", Some(-500)),
                file_url: "/descargas/raro.pdf".into(),
                access: "Pago".into(),
            }))
            .await;

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment_preference()
            .withf(|p| p.items.len() == 1 && p.items[0].id == "cuenco-de-cuarzo" && p.items[0].unit_price == 3200)
            .times(1)
            .returning(|_| Ok(PaymentRedirect { id: None, redirect_url: Some("https://pay.example/c".into()) }));
        let outcome = service(&store, Some(gateway))
            .checkout_cart(cart(r#"[{"slug":"raro","quantity":1},{"slug":"cuenco-de-cuarzo","quantity":1}]"#))
            .await?;
        assert!(matches!(outcome, CheckoutOutcome::Redirect { .. }));
        assert_eq!(store.get_order(outcome.order_id()).await?.ok_or("order missing")?.total, 3200);

        let mut idle = MockPaymentGateway::new();
        idle.expect_create_payment_preference().never();
        let outcome = service(&store, Some(idle))
            .checkout_cart(cart(r#"[{"slug":"raro","quantity":1},{"slug":"guia-de-respiracion","quantity":1}]"#))
            .await?;
        let CheckoutOutcome::Downloads { order_id, links } = outcome else { panic!("expected downloads") };
        assert_eq!(links.iter().map(|l| l.slug.as_str()).collect::<Vec<_>>(), vec!["guia-de-respiracion"]);
        assert_eq!(store.get_order(order_id).await?.ok_or("order missing")?.total, 0);
        assert!(store.download_access().await.iter().all(|a| a.file_slug != "raro"));

        let only_negative = service(&store, None).checkout_cart(cart(r#"[{"slug":"raro","quantity":1}]"#)).await;
        assert!(matches!(only_negative, Err(CheckoutError::InvalidProducts)));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_gateway_fails_before_creating_order() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let result = service(&store, None).checkout_cart(cart(r#"[{"slug":"sesion-1-a-1","quantity":1}]"#)).await;
        assert!(matches!(result, Err(CheckoutError::GatewayMisconfigured)));
        assert!(store.list_orders().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_order_pending() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment_preference()
            .returning(|_| Err(GatewayError::Rejected { status: 500, body: "boom".into() }));

        let result = service(&store, Some(gateway)).checkout_cart(cart(r#"[{"slug":"sesion-1-a-1","quantity":1}]"#)).await;
        assert!(matches!(result, Err(CheckoutError::Gateway(_))));

        let orders = store.list_orders().await?;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert_eq!(orders[0].total, 2250);
        assert!(orders[0].payment_reference.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_redirect_still_records_reference() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment_preference()
            .returning(|_| Ok(PaymentRedirect { id: Some("pref-9".into()), redirect_url: None }));

        let result = service(&store, Some(gateway)).checkout_cart(cart(r#"[{"slug":"sesion-1-a-1","quantity":1}]"#)).await;
        assert!(matches!(result, Err(CheckoutError::MissingRedirect)));
        assert_eq!(store.list_orders().await?[0].payment_reference.as_deref(), Some("pref-9"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_and_unresolvable_carts_are_rejected() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let checkout = service(&store, Some(MockPaymentGateway::new()));

        assert!(matches!(checkout.checkout_cart(cart("[]")).await, Err(CheckoutError::EmptyCart)));
        assert!(matches!(
            checkout.checkout_cart(cart(r#"[{"slug":"no-existe","quantity":1}]"#)).await,
            Err(CheckoutError::InvalidProducts)
        ));
        assert!(store.list_orders().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_buyer_is_rejected() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let mut request = cart(r#"[{"slug":"sesion-1-a-1","quantity":1}]"#);
        request.buyer.email = "not-an-email".into();

        let result = service(&store, Some(MockPaymentGateway::new())).checkout_cart(request).await;
        assert!(matches!(result, Err(CheckoutError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_outcome() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let checkout = service(&store, Some(redirecting_gateway(1)));
        let key = Uuid::new_v4();

        let mut request = cart(r#"[{"slug":"bano-de-bosque","quantity":3,"couponCode":"grupo"}]"#);
        request.idempotency_key = Some(key);

        let first = checkout.checkout_cart(request.clone()).await?;
        let second = checkout.checkout_cart(request).await?;
        assert_eq!(first, second);
        assert_eq!(store.list_orders().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_single_checkout_scopes_return_urls() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment_preference()
            .withf(|p| {
                p.back_urls.pending == "https://almanatura.uy/checkout/bano-de-bosque?status=pending"
                    && p.items[0].quantity == 1
                    && p.items[0].unit_price == 1800
                    && p.metadata["product"] == "bano-de-bosque"
            })
            .times(1)
            .returning(|_| Ok(PaymentRedirect { id: None, redirect_url: Some("https://pay.example/x".into()) }));

        // GRUPO needs three units, so it cannot apply to a single purchase.
        let outcome = service(&store, Some(gateway)).checkout_single("bano-de-bosque", "GRUPO", buyer(), None).await?;
        assert!(matches!(outcome, CheckoutOutcome::Redirect { .. }));

        let unknown = service(&store, None).checkout_single("  ", "", buyer(), None).await;
        assert!(matches!(unknown, Err(CheckoutError::InvalidProducts)));
        Ok(())
    }

    #[tokio::test]
    async fn test_checkout_reads_live_catalog() -> TestResult {
        let store = Arc::new(InMemoryStore::demo()?);
        let checkout = service(&store, Some(redirecting_gateway(1)));

        let mut product = store.get_product_by_slug("sesion-1-a-1").await?.ok_or("missing")?;
        if let Product::Experience(experience) = &mut product {
            experience.listing.discount_percent = crate::domain::value_objects::Percent::clamped(50);
        }
        store.upsert_product(product).await;

        let outcome = checkout.checkout_cart(cart(r#"[{"slug":"sesion-1-a-1","quantity":1}]"#)).await?;
        let order = store.get_order(outcome.order_id()).await?.ok_or("order missing")?;
        assert_eq!(order.items[0].price, 1250);
        Ok(())
    }
}
