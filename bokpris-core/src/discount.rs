//! Buyer net price: standing discount, promotions and shipping thresholds
//!
//! [`DiscountEngine::discounted_price`] is pure: same inputs, same output, no
//! I/O. The reference date is always passed in by the caller.

use crate::{round2, ConfigError, Day, PricingError, Retailer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable discount and shipping terms for one retailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetailerPolicy {
    pub retailer: Retailer,
    /// Fraction in `[0, 1)`, e.g. `0.05` for 5%.
    pub standing_discount_rate: f64,
    pub shipping_cost: f64,
    /// Net prices strictly below this pay `shipping_cost`.
    pub free_shipping_threshold: f64,
}

/// Temporally scoped override of a retailer's standing discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Promotion {
    pub retailer: Retailer,
    pub name: String,
    pub discount_rate: f64,
    pub start_date: Day,
    pub end_date: Day,
}

impl Promotion {
    /// Reject ranges that end before they start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end_date < self.start_date {
            return Err(ConfigError::InvalidPromotionRange {
                retailer: self.retailer,
                name: self.name.clone(),
                start: self.start_date.to_string(),
                end: self.end_date.to_string(),
            });
        }
        Ok(())
    }

    /// Inclusive on both ends. A malformed range is never active.
    pub fn is_active_on(&self, day: Day) -> bool {
        self.validate().is_ok() && self.start_date <= day && day <= self.end_date
    }
}

/// Result of applying a retailer's terms to a base price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountedPrice {
    /// e.g. `"209.00 kr (inkl. 10% studentrabatt + 29 kr frakt)"`
    pub display_price: String,
    /// Price after discount, shipping included when it applies.
    pub net_price: f64,
    pub shipping_added: bool,
    pub effective_rate_percent: u32,
    pub promotion_name: Option<String>,
}

/// Discount calculator over the configured policies and promotions.
#[derive(Debug, Clone, Default)]
pub struct DiscountEngine {
    policies: HashMap<Retailer, RetailerPolicy>,
    promotions: HashMap<Retailer, Promotion>,
}

impl DiscountEngine {
    /// Build from configuration.
    ///
    /// Promotions with an inverted date range are dropped with a warning and
    /// the standing discount applies for that retailer. With several
    /// promotions for one retailer the last one listed wins.
    pub fn new(policies: Vec<RetailerPolicy>, promotions: Vec<Promotion>) -> Self {
        let policies = policies.into_iter().map(|p| (p.retailer, p)).collect();

        let mut active = HashMap::new();
        for promotion in promotions {
            if let Err(e) = promotion.validate() {
                tracing::warn!(
                    retailer = %promotion.retailer,
                    promotion = %promotion.name,
                    error = %e,
                    "Ignoring promotion with invalid date range"
                );
                continue;
            }
            active.insert(promotion.retailer, promotion);
        }

        Self {
            policies,
            promotions: active,
        }
    }

    pub fn policy(&self, retailer: Retailer) -> Option<&RetailerPolicy> {
        self.policies.get(&retailer)
    }

    pub fn has_policy(&self, retailer: Retailer) -> bool {
        self.policies.contains_key(&retailer)
    }

    /// The promotion governing `retailer` on `day`, if any.
    pub fn active_promotion(&self, retailer: Retailer, day: Day) -> Option<&Promotion> {
        self.promotions
            .get(&retailer)
            .filter(|promo| promo.is_active_on(day))
    }

    /// Net buyer price for `base_price` at `retailer` on `reference_date`.
    ///
    /// # Errors
    /// * `PricingError::InvalidBasePrice` - negative, NaN or infinite base price
    /// * `PricingError::NoPolicy` - retailer has no discount terms configured
    pub fn discounted_price(
        &self,
        base_price: f64,
        retailer: Retailer,
        reference_date: Day,
    ) -> Result<DiscountedPrice, PricingError> {
        if !base_price.is_finite() || base_price < 0.0 {
            return Err(PricingError::InvalidBasePrice { value: base_price });
        }
        let policy = self
            .policy(retailer)
            .ok_or(PricingError::NoPolicy { retailer })?;

        let promotion = self.active_promotion(retailer, reference_date);
        let rate = promotion
            .map(|p| p.discount_rate)
            .unwrap_or(policy.standing_discount_rate);

        let mut net = base_price * (1.0 - rate);
        let shipping_added = net < policy.free_shipping_threshold;
        if shipping_added {
            net += policy.shipping_cost;
        }
        let net = round2(net);

        let effective_rate_percent = (rate * 100.0).round() as u32;
        let label = match promotion {
            Some(p) => format!("{}-rabatt", p.name),
            None => "studentrabatt".to_string(),
        };
        let shipping = if shipping_added {
            format!(" + {} kr frakt", format_amount(policy.shipping_cost))
        } else {
            ", fri frakt".to_string()
        };

        Ok(DiscountedPrice {
            display_price: format!(
                "{:.2} kr (inkl. {}% {}{})",
                net, effective_rate_percent, label, shipping
            ),
            net_price: net,
            shipping_added,
            effective_rate_percent,
            promotion_name: promotion.map(|p| p.name.clone()),
        })
    }
}

/// `29.0` as `"29"`, `29.5` as `"29.50"`.
fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
