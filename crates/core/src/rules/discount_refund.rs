//! Flags a variant that is being discounted hard and refunded often at
//! the same time, burning margin at both ends.

use rust_decimal::Decimal;

use crate::domain::decision::{
    Confidence, DecisionCandidate, DecisionKey, Evidence, RuleKind,
};

use super::{monthly_rate, DetectionRule, RuleContext};

const MIN_DISCOUNT_RATE_PCT: f64 = 20.0;
const MIN_REFUND_RATE_PCT: f64 = 15.0;
const MIN_UNITS: u32 = 10;
const HIGH_CONFIDENCE_UNITS: u32 = 20;
const MEDIUM_CONFIDENCE_UNITS: u32 = 15;

pub struct DiscountRefundRule;

fn confidence_for(units: u32) -> Confidence {
    if units >= HIGH_CONFIDENCE_UNITS {
        Confidence::High
    } else if units >= MEDIUM_CONFIDENCE_UNITS {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

impl DetectionRule for DiscountRefundRule {
    fn kind(&self) -> RuleKind {
        RuleKind::DiscountRefund
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<DecisionCandidate> {
        let worst = ctx
            .metrics
            .iter()
            .filter(|m| m.cost_known)
            .filter(|m| m.discount_rate_pct >= MIN_DISCOUNT_RATE_PCT)
            .filter(|m| m.refund_rate_pct >= MIN_REFUND_RATE_PCT)
            .filter(|m| m.units_sold >= MIN_UNITS)
            .filter(|m| m.net_profit < Decimal::ZERO)
            .min_by(|a, b| {
                a.net_profit.cmp(&b.net_profit).then_with(|| a.variant_id.cmp(&b.variant_id))
            })?;

        let impact = monthly_rate(worst.net_profit.abs(), ctx.window_days);
        let currency = &ctx.settings.currency;

        Some(DecisionCandidate {
            rule: RuleKind::DiscountRefund,
            key: DecisionKey::Variant {
                rule: RuleKind::DiscountRefund,
                variant_id: worst.variant_id.clone(),
            },
            headline: format!("Discounts and refunds are stacking up on {}", worst.sku),
            action: format!(
                "Pull {} out of the discount rotation and find out why buyers send it back",
                worst.sku
            ),
            reason: format!(
                "{} is discounted {:.0}% of the time and refunded on {:.0}% of its revenue, \
                 netting {} {currency} over the last {} days.",
                worst.sku,
                worst.discount_rate_pct,
                worst.refund_rate_pct,
                worst.net_profit,
                ctx.window_days
            ),
            impact,
            confidence: confidence_for(worst.units_sold),
            evidence: Evidence::VariantProfit {
                variant_id: worst.variant_id.clone(),
                sku: worst.sku.clone(),
                units_sold: worst.units_sold,
                order_count: worst.order_count,
                revenue: worst.revenue,
                total_cost: worst.total_cost,
                total_discounts: worst.total_discounts,
                refunded_revenue: worst.refunded_revenue,
                refunded_units: worst.refunded_units,
                shipping_cost: worst.shipping_cost,
                net_profit: worst.net_profit,
                margin_pct: worst.margin_pct,
            },
            context: None,
        })
    }
}
