//! Detection rules.
//!
//! Each rule is a pure function from the run context to at most one
//! candidate. Returning none is not an error; it is evidence of a
//! healthy store. Rules are combined from an explicit named list so the
//! set is deterministic and no priority hides in array positions.

pub mod best_seller_loss;
pub mod discount_refund;
pub mod shipping_threshold;

use rust_decimal::Decimal;

use crate::config::MerchantSettings;
use crate::domain::decision::{DecisionCandidate, RuleKind};
use crate::domain::order::OrderRecord;
use crate::profit::VariantProfitMetrics;

pub use best_seller_loss::BestSellerLossRule;
pub use discount_refund::DiscountRefundRule;
pub use shipping_threshold::ShippingThresholdRule;

/// Everything a rule may look at for one run.
pub struct RuleContext<'a> {
    pub settings: &'a MerchantSettings,
    pub orders: &'a [OrderRecord],
    pub metrics: &'a [VariantProfitMetrics],
    pub window_days: u32,
}

pub trait DetectionRule: Send + Sync {
    fn kind(&self) -> RuleKind;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<DecisionCandidate>;
}

/// The full rule set, in the order candidates are collected. Ranking
/// happens later on impact, so this order carries no priority.
pub fn detection_rules() -> Vec<Box<dyn DetectionRule>> {
    vec![
        Box::new(BestSellerLossRule),
        Box::new(ShippingThresholdRule),
        Box::new(DiscountRefundRule),
    ]
}

/// Express a window-observed amount as a monthly rate so decisions rank
/// on a common basis regardless of the lookback window.
pub(crate) fn monthly_rate(amount: Decimal, window_days: u32) -> Decimal {
    if window_days == 0 {
        return Decimal::ZERO;
    }
    (amount * Decimal::from(30u32) / Decimal::from(window_days)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::decision::RuleKind;

    use super::{detection_rules, monthly_rate};

    #[test]
    fn rule_set_is_the_three_named_rules() {
        let kinds: Vec<RuleKind> = detection_rules().iter().map(|rule| rule.kind()).collect();
        assert_eq!(
            kinds,
            vec![RuleKind::BestSellerLoss, RuleKind::ShippingThreshold, RuleKind::DiscountRefund]
        );
    }

    #[test]
    fn monthly_rate_normalizes_a_ninety_day_window() {
        let rate = monthly_rate(Decimal::new(4_000, 2), 90);
        assert_eq!(rate, Decimal::new(1_333, 2));
    }

    #[test]
    fn monthly_rate_is_identity_for_thirty_days() {
        assert_eq!(monthly_rate(Decimal::new(1_000, 2), 30), Decimal::new(1_000, 2));
    }
}
