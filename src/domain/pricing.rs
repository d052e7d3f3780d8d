//! Pricing Engine
//!
//! Turns a list price, a standing markdown and an optional coupon into a
//! per-unit price and a line subtotal. Never fails: malformed input is
//! clamped or defaulted.
//!
//! Markdowns compound. The standing discount is applied and rounded first,
//! then the coupon is applied to that rounded price and rounded again.
//! Rounding is half away from zero (`f64::round`).

use serde::{Deserialize, Serialize};
use crate::domain::aggregates::product::{CouponRule, Priceable};
use crate::domain::value_objects::{Percent, Quantity};

/// Price breakdown for one line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResult {
    pub unit_price: i64,
    pub base_price: i64,
    pub discount_percent: Percent,
    pub coupon_percent: Percent,
    pub subtotal: i64,
}

/// Prices `quantity` units of something listed at `base_price`.
///
/// `quantity` is floored at one and `discount_percent` clamped into
/// `[0, 100]`. The coupon is the first rule whose code equals the trimmed,
/// lower-cased `coupon_code` and whose minimum quantity the line meets.
pub fn calculate_pricing(
    base_price: i64,
    quantity: i64,
    discount_percent: i64,
    coupons: &[CouponRule],
    coupon_code: Option<&str>,
) -> PricingResult {
    let quantity = Quantity::at_least_one(quantity);
    let discount = Percent::clamped(discount_percent);

    let mut unit = base_price;
    if !discount.is_zero() {
        unit = mark_down(unit, discount);
    }

    let coupon = find_coupon(coupons, coupon_code, quantity).map_or(Percent::ZERO, CouponRule::percent);
    if !coupon.is_zero() {
        unit = mark_down(unit, coupon);
    }

    PricingResult {
        unit_price: unit,
        base_price,
        discount_percent: discount,
        coupon_percent: coupon,
        subtotal: unit.saturating_mul(i64::from(quantity.value())),
    }
}

/// Prices a catalog entry; `None` when it carries no list price.
pub fn price_listing<P: Priceable + ?Sized>(item: &P, quantity: i64, coupon_code: Option<&str>) -> Option<PricingResult> {
    let base_price = item.base_price()?;
    Some(calculate_pricing(
        base_price,
        quantity,
        i64::from(item.discount_percent().value()),
        item.coupons(),
        coupon_code,
    ))
}

/// Linear scan, first match in sequence order wins.
fn find_coupon<'a>(coupons: &'a [CouponRule], coupon_code: Option<&str>, quantity: Quantity) -> Option<&'a CouponRule> {
    let code = coupon_code.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty())?;
    let quantity = i64::from(quantity.value());
    coupons.iter().find(|rule| rule.matches_code(&code) && quantity >= rule.min_qty())
}

fn mark_down(unit: i64, percent: Percent) -> i64 {
    (unit as f64 * percent.remaining_fraction()).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ahorro() -> Vec<CouponRule> { vec![CouponRule::new("AHORRO", 10, 2)] }

    #[test]
    fn test_list_price_passes_through() {
        let r = calculate_pricing(100, 1, 0, &[], Some(""));
        assert_eq!((r.unit_price, r.subtotal), (100, 100));
        assert!(r.coupon_percent.is_zero());
    }

    #[test]
    fn test_standing_discount() {
        let r = calculate_pricing(100, 1, 20, &[], None);
        assert_eq!((r.unit_price, r.subtotal), (80, 80));
        assert_eq!(r.discount_percent.value(), 20);
    }

    #[test]
    fn test_coupon_compounds_on_discounted_price() {
        let r = calculate_pricing(100, 3, 10, &ahorro(), Some("ahorro"));
        assert_eq!(r.unit_price, 81);
        assert_eq!(r.coupon_percent.value(), 10);
        assert_eq!(r.subtotal, 243);
    }

    #[test]
    fn test_coupon_below_min_qty_is_ignored() {
        let r = calculate_pricing(100, 1, 10, &ahorro(), Some("ahorro"));
        assert_eq!((r.unit_price, r.subtotal), (90, 90));
        assert!(r.coupon_percent.is_zero());
    }

    #[test]
    fn test_coupon_code_is_trimmed_and_case_insensitive() {
        let rules = vec![CouponRule::new("  Luna ", 50, 1)];
        assert_eq!(calculate_pricing(200, 1, 0, &rules, Some(" LUNA ")).unit_price, 100);
    }

    #[test]
    fn test_first_matching_coupon_wins() {
        let rules = vec![
            CouponRule::new("DUO", 5, 3),
            CouponRule::new("duo", 10, 1),
            CouponRule::new("DUO", 40, 1),
        ];
        let r = calculate_pricing(100, 2, 0, &rules, Some("duo"));
        assert_eq!(r.coupon_percent.value(), 10, "the 3-unit rule is skipped, the next one in order applies");
    }

    #[test]
    fn test_inputs_are_normalized() {
        let r = calculate_pricing(100, 0, 150, &[], None);
        assert_eq!(r.discount_percent.value(), 100);
        assert_eq!((r.unit_price, r.subtotal), (0, 0));

        let r = calculate_pricing(100, -4, -10, &[], None);
        assert_eq!(r.discount_percent.value(), 0);
        assert_eq!(r.subtotal, 100, "non-positive quantity counts as one");
    }

    #[test]
    fn test_rounds_half_away_from_zero_at_each_step() {
        // 5 * 0.9 = 4.5 -> 5, then 5 * 0.5 = 2.5 -> 3
        let rules = vec![CouponRule::new("MITAD", 50, 1)];
        let r = calculate_pricing(5, 1, 10, &rules, Some("mitad"));
        assert_eq!(r.unit_price, 3);

        // 15 * 0.5 = 7.5 -> 8
        assert_eq!(calculate_pricing(15, 1, 50, &[], None).unit_price, 8);
    }

    #[test]
    fn test_price_listing_skips_unpriced() {
        use crate::domain::aggregates::product::Listing;
        use crate::domain::value_objects::Slug;
        let free = Listing::new(Slug::new("charla").unwrap(), "Charla", None);
        assert_eq!(price_listing(&free, 1, None), None);
        let priced = Listing::new(Slug::new("taller").unwrap(), "Taller", Some(1500)).with_discount(100);
        assert_eq!(price_listing(&priced, 2, None).map(|r| r.subtotal), Some(0));
    }

    proptest! {
        #[test]
        fn prop_unit_price_never_exceeds_base(base in 0i64..1_000_000, qty in 1i64..100, discount in 0i64..=100, coupon in -50i64..200, min_qty in -5i64..10) {
            let rules = vec![CouponRule::new("CODE", coupon, min_qty)];
            let r = calculate_pricing(base, qty, discount, &rules, Some("code"));
            prop_assert!(r.unit_price <= r.base_price);
            prop_assert!(r.unit_price >= 0);
            prop_assert_eq!(r.subtotal, r.unit_price * qty);
        }

        #[test]
        fn prop_percentages_stay_in_range(discount in any::<i64>(), coupon in any::<i64>()) {
            let rules = vec![CouponRule::new("x", coupon, 1)];
            let r = calculate_pricing(500, 1, discount, &rules, Some("X"));
            prop_assert!(r.discount_percent.value() <= 100);
            prop_assert!(r.coupon_percent.value() <= 100);
        }

        #[test]
        fn prop_unmet_min_qty_never_applies(qty in 1i64..50, extra in 1i64..50) {
            let rules = vec![CouponRule::new("VOLUMEN", 30, qty + extra)];
            let r = calculate_pricing(1000, qty, 0, &rules, Some("volumen"));
            prop_assert!(r.coupon_percent.is_zero());
        }

        #[test]
        fn prop_deterministic(base in 0i64..100_000, qty in 1i64..30, discount in 0i64..=100) {
            let rules = ahorro();
            let a = calculate_pricing(base, qty, discount, &rules, Some("ahorro"));
            let b = calculate_pricing(base, qty, discount, &rules, Some("ahorro"));
            prop_assert_eq!(a, b);
        }
    }
}
