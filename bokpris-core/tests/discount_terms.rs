//! Buyer prices under the production discount and shipping terms.

use bokpris_core::{DiscountEngine, PricingError, Retailer};
use bokpris_test_utils::{april_promotion, day, production_engine, production_policies};

#[test]
fn test_standing_discount_above_threshold() {
    let result = production_engine()
        .discounted_price(300.0, Retailer::Bokus, day(2025, 6, 1))
        .unwrap();
    assert!((result.net_price - 285.0).abs() < 1e-9);
    assert!(!result.shipping_added);
    assert_eq!(result.effective_rate_percent, 5);
    assert_eq!(result.promotion_name, None);
    assert_eq!(result.display_price, "285.00 kr (inkl. 5% studentrabatt, fri frakt)");
}

#[test]
fn test_shipping_added_below_threshold() {
    let result = production_engine()
        .discounted_price(200.0, Retailer::Akademibokhandeln, day(2025, 4, 15))
        .unwrap();
    assert!((result.net_price - 209.0).abs() < 1e-9);
    assert!(result.shipping_added);
    assert_eq!(
        result.display_price,
        "209.00 kr (inkl. 10% studentrabatt + 29 kr frakt)"
    );
}

#[test]
fn test_promotion_overrides_then_reverts() {
    let engine = production_engine();

    let during = engine
        .discounted_price(300.0, Retailer::Bokus, day(2025, 4, 30))
        .unwrap();
    assert_eq!(during.effective_rate_percent, 10);
    assert_eq!(during.promotion_name.as_deref(), Some("APRIL25"));
    assert!((during.net_price - 270.0).abs() < 1e-9);
    assert!(during.display_price.contains("APRIL25-rabatt"));

    let after = engine
        .discounted_price(300.0, Retailer::Bokus, day(2025, 5, 1))
        .unwrap();
    assert_eq!(after.effective_rate_percent, 5);
    assert_eq!(after.promotion_name, None);
}

#[test]
fn test_promotion_start_is_inclusive() {
    let engine = production_engine();
    let first = engine
        .discounted_price(300.0, Retailer::Bokus, day(2025, 4, 1))
        .unwrap();
    assert_eq!(first.promotion_name.as_deref(), Some("APRIL25"));

    let before = engine
        .discounted_price(300.0, Retailer::Bokus, day(2025, 3, 31))
        .unwrap();
    assert_eq!(before.promotion_name, None);
}

#[test]
fn test_inverted_promotion_is_ignored() {
    let mut promo = april_promotion();
    std::mem::swap(&mut promo.start_date, &mut promo.end_date);
    assert!(promo.validate().is_err());
    assert!(!promo.is_active_on(day(2025, 4, 15)));

    let engine = DiscountEngine::new(production_policies(), vec![promo]);
    let result = engine
        .discounted_price(300.0, Retailer::Bokus, day(2025, 4, 15))
        .unwrap();
    assert_eq!(result.effective_rate_percent, 5);
}

#[test]
fn test_invalid_base_price_is_marked_failure() {
    let engine = production_engine();
    assert!(matches!(
        engine.discounted_price(-1.0, Retailer::Bokus, day(2025, 1, 1)),
        Err(PricingError::InvalidBasePrice { .. })
    ));
    assert!(matches!(
        engine.discounted_price(f64::NAN, Retailer::Bokus, day(2025, 1, 1)),
        Err(PricingError::InvalidBasePrice { .. })
    ));
}

#[test]
fn test_missing_policy() {
    let result = production_engine().discounted_price(100.0, Retailer::Studentapan, day(2025, 1, 1));
    assert_eq!(
        result,
        Err(PricingError::NoPolicy {
            retailer: Retailer::Studentapan
        })
    );
}

#[test]
fn test_zero_base_price_pays_shipping() {
    let result = production_engine()
        .discounted_price(0.0, Retailer::Bokus, day(2025, 6, 1))
        .unwrap();
    assert!(result.shipping_added);
    assert!((result.net_price - 29.0).abs() < 1e-9);
}
