//! Flags the highest-volume variant that sells at a loss or a razor-thin
//! margin. Severity is volume-weighted so a low-volume outlier cannot
//! dominate the pick.

use rust_decimal::Decimal;

use crate::domain::decision::{
    Confidence, DecisionCandidate, DecisionKey, Evidence, RuleKind,
};
use crate::profit::VariantProfitMetrics;

use super::{monthly_rate, DetectionRule, RuleContext};

/// How many top sellers (by units) are inspected.
const TOP_SELLER_POOL: usize = 20;
/// Margin below which a seller counts as unhealthy even when positive.
const THIN_MARGIN_PCT: f64 = 5.0;
/// Units required before the rule will speak up at all.
const MIN_UNITS: u32 = 10;
/// Units at which confidence is high.
const HIGH_CONFIDENCE_UNITS: u32 = 20;

pub struct BestSellerLossRule;

fn severity(metrics: &VariantProfitMetrics) -> Decimal {
    Decimal::from(metrics.units_sold) * metrics.net_profit.abs()
}

fn confidence_for(units: u32) -> Confidence {
    if units >= HIGH_CONFIDENCE_UNITS {
        Confidence::High
    } else if units >= MIN_UNITS {
        Confidence::Medium
    } else {
        // evaluate() filters at MIN_UNITS, which coincides with the
        // medium bound, so this arm never labels a surfaced candidate.
        Confidence::Low
    }
}

impl DetectionRule for BestSellerLossRule {
    fn kind(&self) -> RuleKind {
        RuleKind::BestSellerLoss
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<DecisionCandidate> {
        let mut top_sellers: Vec<&VariantProfitMetrics> =
            ctx.metrics.iter().filter(|m| m.cost_known).collect();
        top_sellers.sort_by(|a, b| {
            b.units_sold.cmp(&a.units_sold).then_with(|| a.variant_id.cmp(&b.variant_id))
        });
        top_sellers.truncate(TOP_SELLER_POOL);

        let worst = top_sellers
            .into_iter()
            .filter(|m| m.net_profit < Decimal::ZERO || m.margin_pct < THIN_MARGIN_PCT)
            .filter(|m| m.units_sold >= MIN_UNITS)
            .max_by(|a, b| {
                severity(a).cmp(&severity(b)).then_with(|| b.variant_id.cmp(&a.variant_id))
            })?;

        let impact = monthly_rate(worst.net_profit.abs(), ctx.window_days);
        let currency = &ctx.settings.currency;

        Some(DecisionCandidate {
            rule: RuleKind::BestSellerLoss,
            key: DecisionKey::Variant {
                rule: RuleKind::BestSellerLoss,
                variant_id: worst.variant_id.clone(),
            },
            headline: format!("Your best seller {} is losing money", worst.sku),
            action: format!(
                "Reprice {} or renegotiate its unit cost before it sells another batch",
                worst.sku
            ),
            reason: format!(
                "{} units over the last {} days came out at {} {currency} net \
                 ({:.1}% margin) after cost, shipping, discounts and refunds.",
                worst.units_sold, ctx.window_days, worst.net_profit, worst.margin_pct
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

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::config::{EngineDefaults, MerchantSettings};
    use crate::domain::decision::Confidence;
    use crate::profit::VariantProfitMetrics;
    use crate::rules::{DetectionRule, RuleContext};

    use super::BestSellerLossRule;

    fn metrics(variant: &str, units: u32, net_pence: i64) -> VariantProfitMetrics {
        let revenue = Decimal::new(i64::from(units) * 1_000, 2);
        let net_profit = Decimal::new(net_pence, 2);
        let margin_pct = if revenue.is_zero() {
            0.0
        } else {
            use rust_decimal::prelude::ToPrimitive;
            (net_profit / revenue * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
        };
        VariantProfitMetrics {
            variant_id: variant.to_string(),
            sku: format!("SKU-{variant}"),
            units_sold: units,
            order_count: units,
            revenue,
            avg_price: Decimal::new(1_000, 2),
            total_cost: revenue - net_profit,
            cost_known: true,
            total_discounts: Decimal::ZERO,
            discount_rate_pct: 0.0,
            refunded_revenue: Decimal::ZERO,
            refunded_units: 0,
            refund_rate_pct: 0.0,
            shipping_cost: Decimal::ZERO,
            gross_profit: net_profit,
            net_profit,
            margin_pct,
        }
    }

    fn ctx<'a>(
        settings: &'a MerchantSettings,
        metrics: &'a [VariantProfitMetrics],
    ) -> RuleContext<'a> {
        RuleContext { settings, orders: &[], metrics, window_days: 90 }
    }

    #[test]
    fn quiet_when_every_seller_is_healthy() {
        let settings = MerchantSettings::new("shop-1", &EngineDefaults::default());
        let healthy = vec![metrics("v-1", 50, 40_000), metrics("v-2", 30, 25_000)];
        assert!(BestSellerLossRule.evaluate(&ctx(&settings, &healthy)).is_none());
    }

    #[test]
    fn quiet_below_minimum_units() {
        let settings = MerchantSettings::new("shop-1", &EngineDefaults::default());
        let thin = vec![metrics("v-1", 5, -2_000)];
        assert!(BestSellerLossRule.evaluate(&ctx(&settings, &thin)).is_none());
    }

    #[test]
    fn unknown_cost_variants_are_excluded() {
        let settings = MerchantSettings::new("shop-1", &EngineDefaults::default());
        let mut unknown = metrics("v-1", 40, -4_000);
        unknown.cost_known = false;
        let pool = vec![unknown];
        assert!(BestSellerLossRule.evaluate(&ctx(&settings, &pool)).is_none());
    }

    #[test]
    fn fires_on_losing_best_seller_with_monthly_impact() {
        let settings = MerchantSettings::new("shop-1", &EngineDefaults::default());
        // 40 units, net -£40.00 over 90 days.
        let pool = vec![metrics("v-1", 40, -4_000)];

        let candidate =
            BestSellerLossRule.evaluate(&ctx(&settings, &pool)).expect("candidate fires");
        assert_eq!(candidate.impact, Decimal::new(1_333, 2));
        assert_eq!(candidate.confidence, Confidence::High);
        assert_eq!(candidate.key.to_string(), "best_seller_loss:v-1");
    }

    #[test]
    fn volume_weighted_severity_beats_raw_loss() {
        let settings = MerchantSettings::new("shop-1", &EngineDefaults::default());
        // v-low loses more per window but barely sells; v-high has the
        // larger units x |loss| score.
        let pool = vec![metrics("v-low", 10, -5_000), metrics("v-high", 60, -2_000)];

        let candidate =
            BestSellerLossRule.evaluate(&ctx(&settings, &pool)).expect("candidate fires");
        assert_eq!(candidate.key.to_string(), "best_seller_loss:v-high");
    }

    #[test]
    fn thin_positive_margin_still_fires_medium() {
        let settings = MerchantSettings::new("shop-1", &EngineDefaults::default());
        // 12 units, +£1.20 net on £120 revenue = 1% margin.
        let pool = vec![metrics("v-1", 12, 120)];

        let candidate =
            BestSellerLossRule.evaluate(&ctx(&settings, &pool)).expect("candidate fires");
        assert_eq!(candidate.confidence, Confidence::Medium);
    }
}
