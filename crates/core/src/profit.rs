//! Per-variant profitability over an order window.
//!
//! Purely functional over its inputs: orders in, metrics out. Refund
//! amounts stay attributed to the order carrying the refund record, and a
//! variant with no known cost contributes zero to its cost accumulator
//! rather than being zero-cost-filled.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::cost::CostLookup;
use crate::domain::order::OrderRecord;

/// Derived profitability figures for one product variant. Recomputed
/// every run, never persisted on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantProfitMetrics {
    pub variant_id: String,
    pub sku: String,
    pub units_sold: u32,
    pub order_count: u32,
    pub revenue: Decimal,
    pub avg_price: Decimal,
    pub total_cost: Decimal,
    /// False when the variant is absent from the cost lookup. Rules that
    /// depend on cost must skip such variants.
    pub cost_known: bool,
    pub total_discounts: Decimal,
    pub discount_rate_pct: f64,
    pub refunded_revenue: Decimal,
    pub refunded_units: u32,
    pub refund_rate_pct: f64,
    pub shipping_cost: Decimal,
    pub gross_profit: Decimal,
    pub net_profit: Decimal,
    pub margin_pct: f64,
}

#[derive(Default)]
struct Accumulator {
    sku: String,
    units_sold: u32,
    order_count: u32,
    revenue: Decimal,
    total_cost: Decimal,
    cost_known: bool,
    total_discounts: Decimal,
    refunded_revenue: Decimal,
    refunded_units: u32,
    shipping_cost: Decimal,
}

fn pct(numerator: Decimal, denominator: Decimal) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    (numerator / denominator * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}

/// Compute [`VariantProfitMetrics`] for every variant appearing in at
/// least one line item. Shipping is the merchant's per-order assumption,
/// split evenly across the order's line items.
pub fn compute_variant_metrics(
    orders: &[OrderRecord],
    costs: &CostLookup,
    shipping_per_order: Decimal,
) -> Vec<VariantProfitMetrics> {
    let mut accumulators: HashMap<String, Accumulator> = HashMap::new();

    for order in orders {
        if order.line_items.is_empty() {
            continue;
        }
        let shipping_share = shipping_per_order / Decimal::from(order.line_items.len() as u32);

        let mut seen_in_order: Vec<&str> = Vec::new();
        for line in &order.line_items {
            let quantity = Decimal::from(line.quantity);
            let entry = accumulators.entry(line.variant_id.clone()).or_default();
            if entry.sku.is_empty() {
                entry.sku = line.sku.clone();
            }

            entry.units_sold += line.quantity;
            entry.revenue += line.discounted_unit_price * quantity;
            entry.total_discounts += (line.unit_price - line.discounted_unit_price) * quantity;
            entry.shipping_cost += shipping_share;
            if let Some(unit_cost) = costs.unit_cost(&line.variant_id) {
                entry.total_cost += unit_cost * quantity;
                entry.cost_known = true;
            }

            if !seen_in_order.contains(&line.variant_id.as_str()) {
                entry.order_count += 1;
                seen_in_order.push(line.variant_id.as_str());
            }
        }

        for refund in &order.refunds {
            for portion in &refund.line_items {
                // A portion referencing a variant absent from this window
                // is malformed upstream data; skip it rather than abort.
                let Some(entry) = accumulators.get_mut(&portion.variant_id) else {
                    continue;
                };
                entry.refunded_revenue += portion.amount;
                entry.refunded_units += portion.quantity;
            }
        }
    }

    let mut metrics: Vec<VariantProfitMetrics> = accumulators
        .into_iter()
        .map(|(variant_id, acc)| {
            let gross_profit = acc.revenue - acc.total_cost;
            let net_profit = acc.revenue
                - acc.total_cost
                - acc.shipping_cost
                - acc.total_discounts
                - acc.refunded_revenue;
            let avg_price = if acc.units_sold == 0 {
                Decimal::ZERO
            } else {
                acc.revenue / Decimal::from(acc.units_sold)
            };

            VariantProfitMetrics {
                margin_pct: pct(net_profit, acc.revenue),
                discount_rate_pct: pct(acc.total_discounts, acc.revenue + acc.total_discounts),
                refund_rate_pct: pct(acc.refunded_revenue, acc.revenue),
                variant_id,
                sku: acc.sku,
                units_sold: acc.units_sold,
                order_count: acc.order_count,
                revenue: acc.revenue,
                avg_price,
                total_cost: acc.total_cost,
                cost_known: acc.cost_known,
                total_discounts: acc.total_discounts,
                refunded_revenue: acc.refunded_revenue,
                refunded_units: acc.refunded_units,
                shipping_cost: acc.shipping_cost,
                gross_profit,
                net_profit,
            }
        })
        .collect();

    metrics.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));
    metrics
}
