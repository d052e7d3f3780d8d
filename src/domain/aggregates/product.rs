//! Product Aggregate
//!
//! Catalog entries come in three shapes (experiences, physical elements and
//! downloadable guides) that share a priced [`Listing`].

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{deserialize_lenient_int, Percent, Slug};

/// Quantity-gated markdown a buyer can invoke by code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponRule {
    #[serde(default)]
    pub code: String,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub percent: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub min_qty: Option<i64>,
}

impl CouponRule {
    pub fn new(code: impl Into<String>, percent: i64, min_qty: i64) -> Self {
        Self { code: code.into(), percent: Some(percent), min_qty: Some(min_qty) }
    }

    /// Percentage this rule grants, clamped into range.
    pub fn percent(&self) -> Percent { Percent::clamped(self.percent.unwrap_or(0)) }

    /// Minimum line quantity, never below one.
    pub fn min_qty(&self) -> i64 { self.min_qty.filter(|q| *q > 0).unwrap_or(1) }

    /// Case-insensitive, whitespace-insensitive code comparison against an
    /// already normalized code.
    pub fn matches_code(&self, normalized: &str) -> bool { self.code.trim().to_lowercase() == normalized }
}

/// Pricing inputs shared by every catalog variant.
pub trait Priceable {
    /// List price before any markdown; `None` means the entry is not for sale.
    fn base_price(&self) -> Option<i64>;
    fn discount_percent(&self) -> Percent;
    fn coupons(&self) -> &[CouponRule];
}

/// Fields every sellable entry carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub slug: Slug,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub base_price: Option<i64>,
    #[serde(default)]
    pub discount_percent: Percent,
    #[serde(default)]
    pub coupons: Vec<CouponRule>,
    #[serde(default)]
    pub image: String,
}

impl Listing {
    pub fn new(slug: Slug, title: impl Into<String>, base_price: Option<i64>) -> Self {
        Self {
            slug, title: title.into(), description: String::new(), base_price,
            discount_percent: Percent::ZERO, coupons: vec![], image: String::new(),
        }
    }

    pub fn with_discount(mut self, percent: i64) -> Self { self.discount_percent = Percent::clamped(percent); self }
    pub fn with_coupon(mut self, rule: CouponRule) -> Self { self.coupons.push(rule); self }
    pub fn with_description(mut self, description: impl Into<String>) -> Self { self.description = description.into(); self }
    pub fn with_image(mut self, image: impl Into<String>) -> Self { self.image = image.into(); self }
}

impl Priceable for Listing {
    fn base_price(&self) -> Option<i64> { self.base_price }
    fn discount_percent(&self) -> Percent { self.discount_percent }
    fn coupons(&self) -> &[CouponRule] { &self.coupons }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(default)]
    pub details: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    #[serde(flatten)]
    pub listing: Listing,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub access: String,
}

/// A catalog entry resolved by slug.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Product {
    Experience(Experience),
    Element(Element),
    Download(Download),
}

impl Product {
    pub fn listing(&self) -> &Listing {
        match self {
            Self::Experience(e) => &e.listing,
            Self::Element(e) => &e.listing,
            Self::Download(d) => &d.listing,
        }
    }

    pub fn slug(&self) -> &Slug { &self.listing().slug }
    pub fn title(&self) -> &str { &self.listing().title }
    /// Has a usable base price. Negative prices count as unpriced.
    pub fn is_priced(&self) -> bool { self.listing().base_price.is_some_and(|p| p >= 0) }

    /// File location when this entry is downloadable content.
    pub fn file_url(&self) -> Option<&str> {
        match self {
            Self::Download(d) if !d.file_url.is_empty() => Some(&d.file_url),
            _ => None,
        }
    }
}

impl Priceable for Product {
    fn base_price(&self) -> Option<i64> { self.listing().base_price() }
    fn discount_percent(&self) -> Percent { self.listing().discount_percent() }
    fn coupons(&self) -> &[CouponRule] { self.listing().coupons() }
}
