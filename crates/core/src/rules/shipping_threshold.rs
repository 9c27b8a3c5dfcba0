//! Detects a free-shipping threshold that orders cluster just below,
//! where the merchant keeps eating the shipping cost without the basket
//! ever clearing the bar.

use rust_decimal::Decimal;

use crate::domain::decision::{
    Confidence, DecisionCandidate, DecisionKey, Evidence, RuleKind,
};

use super::{monthly_rate, DetectionRule, RuleContext};

/// Round-number thresholds merchants actually configure.
const CANDIDATE_THRESHOLDS: [u32; 8] = [30, 35, 40, 45, 50, 60, 75, 100];
/// Width of the "just below the bar" band, in currency units.
const BAND_WIDTH: u32 = 5;
/// Paid orders required before the distribution is trusted.
const MIN_PAID_ORDERS: u32 = 30;
/// Minimum share of orders the winning cluster must hold.
const MIN_CLUSTER_RATE_PCT: f64 = 15.0;
const HIGH_CONFIDENCE_RATE_PCT: f64 = 25.0;
const MEDIUM_CONFIDENCE_RATE_PCT: f64 = 18.0;

pub struct ShippingThresholdRule;

fn confidence_for(cluster_rate_pct: f64) -> Confidence {
    if cluster_rate_pct >= HIGH_CONFIDENCE_RATE_PCT {
        Confidence::High
    } else if cluster_rate_pct >= MEDIUM_CONFIDENCE_RATE_PCT {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn in_band(subtotal: Decimal, threshold: u32) -> bool {
    let upper = Decimal::from(threshold);
    let lower = upper - Decimal::from(BAND_WIDTH);
    subtotal >= lower && subtotal < upper
}

impl DetectionRule for ShippingThresholdRule {
    fn kind(&self) -> RuleKind {
        RuleKind::ShippingThreshold
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<DecisionCandidate> {
        let paid: Vec<_> =
            ctx.orders.iter().filter(|order| order.financial_status.is_paid()).collect();
        let total_orders = paid.len() as u32;
        if total_orders < MIN_PAID_ORDERS {
            return None;
        }

        // Lowest threshold wins ties, so the pick is deterministic.
        let (threshold, band_orders) = CANDIDATE_THRESHOLDS
            .iter()
            .map(|&threshold| {
                let count =
                    paid.iter().filter(|order| in_band(order.subtotal, threshold)).count() as u32;
                (threshold, count)
            })
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))?;
        if band_orders == 0 {
            return None;
        }

        let cluster_rate_pct = f64::from(band_orders) / f64::from(total_orders) * 100.0;
        if cluster_rate_pct < MIN_CLUSTER_RATE_PCT {
            return None;
        }

        let band: Vec<_> =
            paid.iter().filter(|order| in_band(order.subtotal, threshold)).collect();
        let band_revenue: Decimal = band.iter().map(|order| order.subtotal).sum();
        let band_refunded: Decimal = band.iter().map(|order| order.refunded_total()).sum();

        let shipping_cost = ctx.settings.shipping_cost;
        let impact =
            monthly_rate(Decimal::from(band_orders) * shipping_cost, ctx.window_days);
        let currency = &ctx.settings.currency;

        Some(DecisionCandidate {
            rule: RuleKind::ShippingThreshold,
            key: DecisionKey::Threshold { rule: RuleKind::ShippingThreshold, threshold },
            headline: format!(
                "Orders are piling up just under your {threshold} {currency} free-shipping bar"
            ),
            action: format!(
                "Nudge baskets over {threshold} {currency} with a threshold prompt, or lower \
                 the bar to match where orders actually land"
            ),
            reason: format!(
                "{band_orders} of {total_orders} paid orders ({cluster_rate_pct:.0}%) sat within \
                 {BAND_WIDTH} {currency} below the {threshold} {currency} threshold, each one \
                 absorbing {shipping_cost} {currency} of shipping."
            ),
            impact,
            confidence: confidence_for(cluster_rate_pct),
            evidence: Evidence::ShippingCluster {
                threshold,
                band_orders,
                total_orders,
                cluster_rate_pct,
                shipping_cost,
                band_revenue,
                band_refunded,
            },
            context: None,
        })
    }
}
