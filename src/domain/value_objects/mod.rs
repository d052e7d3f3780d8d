//! Value Objects for the storefront

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Largest quantity a single checkout line may carry.
pub const MAX_LINE_QUANTITY: u32 = 25;

/// Slug value object: the stable, URL-safe identity of a catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub fn new(value: impl Into<String>) -> Result<Self, SlugError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.chars().any(char::is_whitespace) { return Err(SlugError::Whitespace); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self { slug.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SlugError { Empty, Whitespace }
impl std::error::Error for SlugError {}
impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "slug empty"), Self::Whitespace => write!(f, "slug contains whitespace") }
    }
}

/// Percentage clamped into `[0, 100]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Percent = Percent(0);

    /// Clamps any integer into range; never fails.
    pub fn clamped(value: i64) -> Self { Self(value.clamp(0, 100) as u8) }
    pub fn value(self) -> u8 { self.0 }
    pub fn is_zero(self) -> bool { self.0 == 0 }

    /// Remaining fraction after applying this markdown, e.g. 20% -> 0.8.
    pub fn remaining_fraction(self) -> f64 { 1.0 - f64::from(self.0) / 100.0 }
}

/// Line quantity, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: u32) -> Option<Self> { (value > 0).then_some(Self(value)) }
    /// Floors non-positive input at one.
    pub fn at_least_one(value: i64) -> Self { Self(value.clamp(1, i64::from(u32::MAX)) as u32) }
    /// Clamps into `[1, MAX_LINE_QUANTITY]`.
    pub fn capped(value: i64) -> Self { Self(value.clamp(1, i64::from(MAX_LINE_QUANTITY)) as u32) }
    pub fn value(self) -> u32 { self.0 }
    pub fn add(self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
}

impl Default for Quantity { fn default() -> Self { Self::ONE } }

/// Reads an integer out of loosely-typed stored JSON.
///
/// Numbers are truncated, numeric strings are parsed, anything else
/// (null, booleans, garbage, non-finite) yields `None` so callers can apply
/// their own default.
pub fn lenient_int(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

/// Serde adapter around [`lenient_int`] for optional integer fields.
pub fn deserialize_lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(lenient_int(&value))
}
