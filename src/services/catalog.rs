//! Cart pricing aggregation and the client price preview.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::aggregates::{CartLine, Product};
use crate::domain::{price_listing, PricingResult};
use crate::infrastructure::repository::{ProductRepository, RepositoryError};

/// A cart line resolved against the live catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedLine {
    pub product: Product,
    pub line: CartLine,
    pub pricing: PricingResult,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub lines: Vec<DetailedLine>,
    pub total: i64,
}

#[derive(Clone)]
pub struct CatalogService {
    products: Arc<dyn ProductRepository>,
}

impl CatalogService {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self { Self { products } }

    pub async fn product(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        self.products.get_product_by_slug(slug).await
    }

    /// Prices every line against the current catalog. Lines with no quantity,
    /// or whose product is gone or unpriced, are left out of both the lines
    /// and the total.
    pub async fn price_cart(&self, lines: &[CartLine]) -> Result<CartSummary, RepositoryError> {
        let mut summary = CartSummary::default();

        for line in lines.iter().filter(|l| l.quantity > 0) {
            let Some(product) = self.products.get_product_by_slug(&line.slug).await? else {
                tracing::debug!(slug = %line.slug, "dropping line for unknown product");
                continue;
            };
            if !product.is_priced() {
                tracing::warn!(slug = %line.slug, "dropping line for unpriced product");
                continue;
            }
            let Some(pricing) = price_listing(&product, i64::from(line.quantity), line.coupon_code.as_deref()) else {
                tracing::debug!(slug = %line.slug, "dropping line for unpriced product");
                continue;
            };

            summary.total += pricing.subtotal;
            summary.lines.push(DetailedLine { product, line: line.clone(), pricing });
        }

        Ok(summary)
    }

    /// Current pricing inputs for a comma separated slug list. Unknown slugs
    /// are skipped.
    pub async fn pricing_inputs(&self, raw_slugs: &str) -> Result<Vec<Product>, RepositoryError> {
        let mut found = vec![];
        for slug in split_slugs(raw_slugs) {
            if let Some(product) = self.products.get_product_by_slug(slug).await? {
                found.push(product);
            }
        }
        Ok(found)
    }
}

fn split_slugs(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}
