//! The decision run planner.
//!
//! One run takes a consistent snapshot of orders, costs and history and
//! produces the complete set of records to persist: candidates are
//! generated, contextualized, calibrated, ranked by impact, filtered
//! against thresholds, capped, and checked against previously ignored
//! findings for resurfacing. The planner is pure; persistence happens in
//! the service layer, transactionally per run.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::calibration::{calibrate, ConfidenceStats};
use crate::config::MerchantSettings;
use crate::domain::cost::CostLookup;
use crate::domain::decision::{
    DecisionCandidate, DecisionRecord, DecisionRun, DecisionStatus,
};
use crate::domain::order::OrderRecord;
use crate::profit::compute_variant_metrics;
use crate::rules::{detection_rules, RuleContext};
use crate::seasonality::weekly_pace_context;

/// Below this many orders the run stays quiet rather than guess.
pub const MIN_ORDERS_FOR_RUN: u32 = 30;
/// Cap on simultaneously active decisions per run.
pub const MAX_ACTIVE_DECISIONS: usize = 3;

/// System floor on monthly impact, regardless of merchant settings.
pub fn system_impact_floor() -> Decimal {
    Decimal::new(500, 2)
}

/// A new finding must have grown to at least this multiple of the
/// ignored one's impact before it resurfaces.
fn resurface_growth_factor() -> Decimal {
    Decimal::new(15, 1)
}

pub struct RunInputs<'a> {
    pub run_id: String,
    pub now: DateTime<Utc>,
    pub window_days: u32,
    pub settings: &'a MerchantSettings,
    pub orders: &'a [OrderRecord],
    pub costs: &'a CostLookup,
    /// Ignored decisions that have never been resurfaced.
    pub ignored: &'a [DecisionRecord],
    pub stats: &'a ConfidenceStats,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedDecision {
    pub candidate: DecisionCandidate,
    pub status: DecisionStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunPlan {
    pub run: DecisionRun,
    pub records: Vec<DecisionRecord>,
    /// Id of the ignored decision this run resurfaces, if any.
    pub resurfaced_decision_id: Option<String>,
    /// Merchant state as it should be persisted after this run.
    pub settings: MerchantSettings,
}

impl RunPlan {
    pub fn active(&self) -> Vec<&DecisionRecord> {
        self.records.iter().filter(|r| r.status == DecisionStatus::Active).collect()
    }
}

/// Plan one full engine run over a snapshot of orders and history.
pub fn plan_run(inputs: RunInputs<'_>) -> RunPlan {
    let order_count = inputs.orders.len() as u32;
    let run = DecisionRun {
        id: inputs.run_id.clone(),
        merchant_id: inputs.settings.merchant_id.clone(),
        created_at: inputs.now,
        order_count,
        window_days: inputs.window_days,
    };
    let mut settings = inputs.settings.clone();
    settings.order_count = order_count;
    settings.last_run_at = Some(inputs.now);

    if order_count < MIN_ORDERS_FOR_RUN {
        return RunPlan { run, records: vec![], resurfaced_decision_id: None, settings };
    }

    let metrics =
        compute_variant_metrics(inputs.orders, inputs.costs, inputs.settings.shipping_cost);
    let context = weekly_pace_context(inputs.orders, inputs.now);

    let ctx = RuleContext {
        settings: inputs.settings,
        orders: inputs.orders,
        metrics: &metrics,
        window_days: inputs.window_days,
    };
    let mut candidates: Vec<DecisionCandidate> =
        detection_rules().iter().filter_map(|rule| rule.evaluate(&ctx)).collect();

    for candidate in candidates.iter_mut() {
        candidate.context = context.clone();
    }

    let threshold = inputs.settings.min_impact.max(system_impact_floor());
    let (planned, resurfaced_decision_id) =
        rank_and_activate(candidates, inputs.ignored, threshold);

    let records = planned
        .into_iter()
        .map(|planned| {
            let completed_at = match planned.status {
                DecisionStatus::Active => None,
                // Non-active candidates are part of the audit trail and
                // close out at generation time.
                _ => Some(inputs.now),
            };
            let candidate = planned.candidate;
            // Calibration only adjusts the displayed confidence; the
            // rule's own label is kept on the record so outcome stats
            // aggregate by what the rule said, not what history made
            // of it.
            let base_confidence = candidate.confidence;
            let calibrated = calibrate(candidate.rule, base_confidence, inputs.stats);
            DecisionRecord {
                id: Uuid::new_v4().to_string(),
                merchant_id: inputs.settings.merchant_id.clone(),
                run_id: inputs.run_id.clone(),
                rule: candidate.rule,
                key: candidate.key,
                status: planned.status,
                headline: candidate.headline,
                action: candidate.action,
                reason: candidate.reason,
                impact: candidate.impact,
                confidence: calibrated.confidence,
                base_confidence,
                evidence: candidate.evidence,
                context: candidate.context,
                calibration: calibrated.note,
                created_at: inputs.now,
                completed_at,
                ignored_at: None,
                resurfaced_at: None,
            }
        })
        .collect();

    RunPlan { run, records, resurfaced_decision_id, settings }
}

/// Sort candidates by impact, apply the threshold and the active cap,
/// then run the resurfacing check. Returns every candidate with its
/// planned status plus the id of the ignored record to mark resurfaced.
fn rank_and_activate(
    mut candidates: Vec<DecisionCandidate>,
    ignored: &[DecisionRecord],
    threshold: Decimal,
) -> (Vec<PlannedDecision>, Option<String>) {
    // Deterministic ranking: impact descending, key string as tiebreak.
    candidates.sort_by(|a, b| {
        b.impact.cmp(&a.impact).then_with(|| a.key.to_string().cmp(&b.key.to_string()))
    });

    let mut active_keys: Vec<String> = candidates
        .iter()
        .filter(|candidate| candidate.impact >= threshold)
        .take(MAX_ACTIVE_DECISIONS)
        .map(|candidate| candidate.key.to_string())
        .collect();

    // Strongest resurfacing candidate: a never-resurfaced ignored record
    // whose key matches a new candidate grown to at least 1.5x the
    // recorded impact; ties break toward the highest new impact.
    let resurfacing = ignored
        .iter()
        .filter(|record| {
            record.status == DecisionStatus::Ignored && record.resurfaced_at.is_none()
        })
        .filter_map(|record| {
            let candidate = candidates.iter().find(|c| c.key == record.key)?;
            (candidate.impact >= record.impact * resurface_growth_factor())
                .then_some((record, candidate))
        })
        .max_by(|a, b| {
            a.1.impact.cmp(&b.1.impact).then_with(|| b.0.id.cmp(&a.0.id))
        });

    let mut resurfaced_decision_id = None;
    if let Some((record, candidate)) = resurfacing {
        if candidate.impact >= threshold {
            let key = candidate.key.to_string();
            if !active_keys.contains(&key) {
                if active_keys.len() >= MAX_ACTIVE_DECISIONS {
                    // Displace the lowest-ranked active member.
                    active_keys.pop();
                }
                active_keys.push(key);
            }
            resurfaced_decision_id = Some(record.id.clone());
        }
    }

    let planned = candidates
        .into_iter()
        .map(|candidate| {
            let status = if active_keys.contains(&candidate.key.to_string()) {
                DecisionStatus::Active
            } else {
                DecisionStatus::Done
            };
            PlannedDecision { candidate, status }
        })
        .collect();

    (planned, resurfaced_decision_id)
}
