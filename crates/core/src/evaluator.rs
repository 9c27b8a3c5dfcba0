//! Outcome grading for decisions a merchant acted on.
//!
//! The baseline is derived from the decision's own evidence payload at
//! the moment it was marked done; after the evaluation window elapses, a
//! post-window snapshot is computed from fresh orders scoped to the same
//! variant or threshold cohort, and the result is classified once.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::cost::CostLookup;
use crate::domain::decision::Evidence;
use crate::domain::order::OrderRecord;
use crate::domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};
use crate::profit::compute_variant_metrics;

/// Orders in scope required before deltas mean anything.
pub const MIN_EVALUATION_ORDERS: u32 = 5;

/// Tolerance on profit-per-order and shipping-loss deltas, in currency
/// units.
fn currency_tolerance() -> Decimal {
    Decimal::new(50, 2)
}
/// Tolerance on the refund-rate delta, in percentage points.
const REFUND_TOLERANCE_PP: f64 = 2.0;

/// What slice of the order stream a decision's outcome is measured on.
#[derive(Clone, Debug, PartialEq)]
pub enum EvaluationScope {
    Variant { variant_id: String },
    ThresholdBand { threshold: u32 },
}

impl EvaluationScope {
    pub fn from_evidence(evidence: &Evidence) -> Self {
        match evidence {
            Evidence::VariantProfit { variant_id, .. } => {
                Self::Variant { variant_id: variant_id.clone() }
            }
            Evidence::ShippingCluster { threshold, .. } => {
                Self::ThresholdBand { threshold: *threshold }
            }
        }
    }
}

fn per_order(amount: Decimal, orders: u32) -> Decimal {
    if orders == 0 {
        return Decimal::ZERO;
    }
    (amount / Decimal::from(orders)).round_dp(2)
}

fn rate_pct(numerator: Decimal, denominator: Decimal) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    (numerator / denominator * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}

/// Baseline metrics straight from the evidence payload. Never recomputed
/// from orders: the evidence is the record of what the merchant saw.
pub fn baseline_snapshot(evidence: &Evidence) -> MetricsSnapshot {
    match evidence {
        Evidence::VariantProfit {
            order_count,
            revenue,
            refunded_revenue,
            shipping_cost,
            net_profit,
            ..
        } => MetricsSnapshot {
            profit_per_order: per_order(*net_profit, *order_count),
            refund_rate_pct: rate_pct(*refunded_revenue, *revenue),
            shipping_loss_per_order: per_order(*shipping_cost, *order_count),
        },
        Evidence::ShippingCluster {
            band_orders,
            shipping_cost,
            band_revenue,
            band_refunded,
            ..
        } => MetricsSnapshot {
            profit_per_order: per_order(*band_revenue - *band_refunded, *band_orders)
                - *shipping_cost,
            refund_rate_pct: rate_pct(*band_refunded, *band_revenue),
            shipping_loss_per_order: *shipping_cost,
        },
    }
}

/// Post-window metrics in scope, plus the number of orders that landed
/// in scope, so callers can apply the minimum-sample rule.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopedSample {
    pub snapshot: MetricsSnapshot,
    pub orders_in_scope: u32,
}

/// Compute the post-window snapshot from orders dated within the window
/// after completion, scoped the same way the original decision was.
pub fn post_snapshot(
    scope: &EvaluationScope,
    orders: &[OrderRecord],
    completed_at: DateTime<Utc>,
    window_days: u32,
    costs: &CostLookup,
    shipping_cost: Decimal,
) -> ScopedSample {
    let window_end = completed_at + Duration::days(i64::from(window_days));
    let windowed: Vec<OrderRecord> = orders
        .iter()
        .filter(|order| order.created_at > completed_at && order.created_at <= window_end)
        .cloned()
        .collect();

    match scope {
        EvaluationScope::Variant { variant_id } => {
            let metrics = compute_variant_metrics(&windowed, costs, shipping_cost);
            match metrics.into_iter().find(|m| &m.variant_id == variant_id) {
                Some(m) => ScopedSample {
                    snapshot: MetricsSnapshot {
                        profit_per_order: per_order(m.net_profit, m.order_count),
                        refund_rate_pct: m.refund_rate_pct,
                        shipping_loss_per_order: per_order(m.shipping_cost, m.order_count),
                    },
                    orders_in_scope: m.order_count,
                },
                None => ScopedSample {
                    snapshot: MetricsSnapshot {
                        profit_per_order: Decimal::ZERO,
                        refund_rate_pct: 0.0,
                        shipping_loss_per_order: Decimal::ZERO,
                    },
                    orders_in_scope: 0,
                },
            }
        }
        EvaluationScope::ThresholdBand { threshold } => {
            let upper = Decimal::from(*threshold);
            let lower = upper - Decimal::from(5u32);
            let band: Vec<&OrderRecord> = windowed
                .iter()
                .filter(|order| order.financial_status.is_paid())
                .filter(|order| order.subtotal >= lower && order.subtotal < upper)
                .collect();

            let band_orders = band.len() as u32;
            let band_revenue: Decimal = band.iter().map(|order| order.subtotal).sum();
            let band_discounts: Decimal = band.iter().map(|order| order.total_discounts).sum();
            let band_refunded: Decimal = band.iter().map(|order| order.refunded_total()).sum();

            ScopedSample {
                snapshot: MetricsSnapshot {
                    profit_per_order: per_order(
                        band_revenue - band_discounts - band_refunded,
                        band_orders,
                    ) - if band_orders == 0 { Decimal::ZERO } else { shipping_cost },
                    refund_rate_pct: rate_pct(band_refunded, band_revenue),
                    shipping_loss_per_order: if band_orders == 0 {
                        Decimal::ZERO
                    } else {
                        shipping_cost
                    },
                },
                orders_in_scope: band_orders,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeltaFlag {
    Improved,
    Worsened,
    Neutral,
}

fn currency_delta_flag(baseline: Decimal, post: Decimal, higher_is_better: bool) -> DeltaFlag {
    let delta = if higher_is_better { post - baseline } else { baseline - post };
    if delta >= currency_tolerance() {
        DeltaFlag::Improved
    } else if delta <= -currency_tolerance() {
        DeltaFlag::Worsened
    } else {
        DeltaFlag::Neutral
    }
}

fn refund_delta_flag(baseline_pct: f64, post_pct: f64) -> DeltaFlag {
    let drop = baseline_pct - post_pct;
    if drop >= REFUND_TOLERANCE_PP {
        DeltaFlag::Improved
    } else if drop <= -REFUND_TOLERANCE_PP {
        DeltaFlag::Worsened
    } else {
        DeltaFlag::Neutral
    }
}

/// Two-of-three verdict over the profit, refund and shipping deltas.
pub fn classify(baseline: &MetricsSnapshot, post: &MetricsSnapshot) -> OutcomeClass {
    let flags = [
        currency_delta_flag(baseline.profit_per_order, post.profit_per_order, true),
        refund_delta_flag(baseline.refund_rate_pct, post.refund_rate_pct),
        currency_delta_flag(
            baseline.shipping_loss_per_order,
            post.shipping_loss_per_order,
            false,
        ),
    ];

    let improved = flags.iter().filter(|flag| **flag == DeltaFlag::Improved).count();
    let worsened = flags.iter().filter(|flag| **flag == DeltaFlag::Worsened).count();

    if improved >= 2 {
        OutcomeClass::Improved
    } else if worsened >= 2 {
        OutcomeClass::Worsened
    } else {
        OutcomeClass::NoChange
    }
}

/// Grade one pending outcome against fresh orders. Returns `None` while
/// the window has not elapsed; the already-evaluated guard lives on
/// [`DecisionOutcome::record_evaluation`].
pub fn grade(
    outcome: &DecisionOutcome,
    evidence: &Evidence,
    orders: &[OrderRecord],
    costs: &CostLookup,
    shipping_cost: Decimal,
    now: DateTime<Utc>,
) -> Option<(MetricsSnapshot, OutcomeClass)> {
    if now < outcome.due_at() {
        return None;
    }

    let scope = EvaluationScope::from_evidence(evidence);
    let sample = post_snapshot(
        &scope,
        orders,
        outcome.created_at,
        outcome.window_days,
        costs,
        shipping_cost,
    );

    // Thin post-window evidence is "we cannot tell", not "nothing
    // happened worth grading differently".
    if sample.orders_in_scope < MIN_EVALUATION_ORDERS {
        return Some((sample.snapshot, OutcomeClass::NoChange));
    }

    Some((sample.snapshot, classify(&outcome.baseline, &sample.snapshot)))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::cost::{CostLookup, CostSource, VariantCost};
    use crate::domain::decision::{Confidence, Evidence, RuleKind};
    use crate::domain::order::{FinancialStatus, LineItem, OrderRecord};
    use crate::domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};

    use super::{baseline_snapshot, classify, grade, EvaluationScope, post_snapshot};

    fn snapshot(profit: i64, refund_pct: f64, shipping: i64) -> MetricsSnapshot {
        MetricsSnapshot {
            profit_per_order: Decimal::new(profit, 2),
            refund_rate_pct: refund_pct,
            shipping_loss_per_order: Decimal::new(shipping, 2),
        }
    }

    #[test]
    fn two_of_three_improvements_classify_improved() {
        // Profit delta +0.44 stays inside tolerance; refunds drop 6pp and
        // shipping loss drops exactly 0.50.
        let baseline = snapshot(-26, 12.0, 110);
        let post = snapshot(18, 6.0, 60);
        assert_eq!(classify(&baseline, &post), OutcomeClass::Improved);
    }

    #[test]
    fn two_of_three_regressions_classify_worsened() {
        let baseline = snapshot(100, 5.0, 50);
        let post = snapshot(20, 9.0, 60);
        assert_eq!(classify(&baseline, &post), OutcomeClass::Worsened);
    }

    #[test]
    fn mixed_or_flat_deltas_classify_no_change() {
        let baseline = snapshot(100, 5.0, 50);
        // Profit better, refunds worse, shipping flat.
        let post = snapshot(200, 9.0, 50);
        assert_eq!(classify(&baseline, &post), OutcomeClass::NoChange);

        let flat = snapshot(110, 5.5, 45);
        assert_eq!(classify(&baseline, &flat), OutcomeClass::NoChange);
    }

    #[test]
    fn variant_baseline_comes_from_evidence_only() {
        let evidence = Evidence::VariantProfit {
            variant_id: "v-1".to_string(),
            sku: "SKU-1".to_string(),
            units_sold: 40,
            order_count: 40,
            revenue: Decimal::new(400_000, 2),
            total_cost: Decimal::new(390_000, 2),
            total_discounts: Decimal::ZERO,
            refunded_revenue: Decimal::new(20_000, 2),
            refunded_units: 2,
            shipping_cost: Decimal::new(14_000, 2),
            net_profit: Decimal::new(-4_000, 2),
            margin_pct: -1.0,
        };

        let baseline = baseline_snapshot(&evidence);
        assert_eq!(baseline.profit_per_order, Decimal::new(-100, 2));
        assert_eq!(baseline.shipping_loss_per_order, Decimal::new(350, 2));
        assert!((baseline.refund_rate_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_baseline_treats_shipping_as_the_loss() {
        let evidence = Evidence::ShippingCluster {
            threshold: 50,
            band_orders: 12,
            total_orders: 35,
            cluster_rate_pct: 34.3,
            shipping_cost: Decimal::new(350, 2),
            band_revenue: Decimal::new(56_400, 2),
            band_refunded: Decimal::ZERO,
        };

        let baseline = baseline_snapshot(&evidence);
        assert_eq!(baseline.shipping_loss_per_order, Decimal::new(350, 2));
        assert_eq!(baseline.profit_per_order, Decimal::new(4_700, 2) - Decimal::new(350, 2));
    }

    fn variant_order(id: usize, days_after: i64, completed_at: chrono::DateTime<Utc>) -> OrderRecord {
        let price = Decimal::new(10_000, 2);
        OrderRecord {
            id: format!("ord-{id}"),
            created_at: completed_at + Duration::days(days_after),
            total: price,
            subtotal: price,
            total_discounts: Decimal::ZERO,
            financial_status: FinancialStatus::Paid,
            line_items: vec![LineItem {
                variant_id: "v-1".to_string(),
                sku: "SKU-1".to_string(),
                unit_price: price,
                discounted_unit_price: price,
                quantity: 1,
            }],
            refunds: vec![],
        }
    }

    fn pending_outcome(completed_at: chrono::DateTime<Utc>) -> DecisionOutcome {
        DecisionOutcome {
            decision_id: "dec-1".to_string(),
            merchant_id: "shop-1".to_string(),
            rule: RuleKind::BestSellerLoss,
            confidence: Confidence::High,
            baseline: snapshot(-100, 5.0, 350),
            post: None,
            classification: None,
            window_days: 30,
            created_at: completed_at,
            evaluated_at: None,
        }
    }

    fn variant_evidence() -> Evidence {
        Evidence::VariantProfit {
            variant_id: "v-1".to_string(),
            sku: "SKU-1".to_string(),
            units_sold: 40,
            order_count: 40,
            revenue: Decimal::new(400_000, 2),
            total_cost: Decimal::new(390_000, 2),
            total_discounts: Decimal::ZERO,
            refunded_revenue: Decimal::new(20_000, 2),
            refunded_units: 2,
            shipping_cost: Decimal::new(14_000, 2),
            net_profit: Decimal::new(-4_000, 2),
            margin_pct: -1.0,
        }
    }

    #[test]
    fn grading_before_the_window_elapses_is_a_no_op() {
        let completed_at = Utc::now() - Duration::days(10);
        let outcome = pending_outcome(completed_at);
        let costs = CostLookup::new();

        let result = grade(
            &outcome,
            &variant_evidence(),
            &[],
            &costs,
            Decimal::new(350, 2),
            Utc::now(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn thin_in_scope_sample_grades_no_change() {
        let completed_at = Utc::now() - Duration::days(40);
        let outcome = pending_outcome(completed_at);
        let orders: Vec<OrderRecord> =
            (0..3).map(|i| variant_order(i, i as i64 + 1, completed_at)).collect();
        let costs = CostLookup::new();

        let (_, classification) = grade(
            &outcome,
            &variant_evidence(),
            &orders,
            &costs,
            Decimal::new(350, 2),
            Utc::now(),
        )
        .expect("window elapsed");
        assert_eq!(classification, OutcomeClass::NoChange);
    }

    #[test]
    fn post_window_snapshot_only_counts_orders_inside_the_window() {
        let completed_at = Utc::now() - Duration::days(60);
        let scope = EvaluationScope::Variant { variant_id: "v-1".to_string() };
        let costs = CostLookup::new();

        let orders = vec![
            variant_order(0, -5, completed_at), // before completion
            variant_order(1, 10, completed_at),
            variant_order(2, 20, completed_at),
            variant_order(3, 45, completed_at), // past the 30-day window
        ];

        let sample =
            post_snapshot(&scope, &orders, completed_at, 30, &costs, Decimal::new(350, 2));
        assert_eq!(sample.orders_in_scope, 2);
    }

    #[test]
    fn healthier_post_window_variant_grades_improved() {
        let completed_at = Utc::now() - Duration::days(40);
        let outcome = pending_outcome(completed_at);
        // Cost dropped to £90: profit per order is now
        // 100 - 90 - 3.50 = £6.50 against a -£1.00 baseline, and the
        // refund rate fell from 5% to 0%.
        let orders: Vec<OrderRecord> =
            (0..10).map(|i| variant_order(i, (i as i64 % 28) + 1, completed_at)).collect();
        let costs = CostLookup::from_costs(vec![VariantCost {
            variant_id: "v-1".to_string(),
            unit_cost: Decimal::new(9_000, 2),
            source: CostSource::Manual,
            updated_at: Utc::now(),
        }]);

        let (post, classification) = grade(
            &outcome,
            &variant_evidence(),
            &orders,
            &costs,
            Decimal::new(350, 2),
            Utc::now(),
        )
        .expect("window elapsed");

        assert_eq!(post.profit_per_order, Decimal::new(650, 2));
        assert_eq!(classification, OutcomeClass::Improved);
    }
}
