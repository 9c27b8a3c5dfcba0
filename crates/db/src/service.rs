//! Orchestration over the repositories: running the engine, walking the
//! decision lifecycle, and grading outcomes. The engine itself is pure;
//! this layer owns the clock, the ids and the persistence order.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use marginscout_core::config::EngineDefaults;
use marginscout_core::domain::cost::VariantCost;
use marginscout_core::domain::decision::DecisionRecord;
use marginscout_core::domain::order::OrderRecord;
use marginscout_core::domain::outcome::DecisionOutcome;
use marginscout_core::engine::{plan_run, RunInputs};
use marginscout_core::errors::DomainError;
use marginscout_core::evaluator::{baseline_snapshot, grade};

use crate::repositories::{
    CostRepository, DecisionRepository, OutcomeRepository, RepositoryError, SettingsRepository,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("decision not found: {0}")]
    DecisionNotFound(String),
}

/// What one engine run produced, for callers that render it.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub order_count: u32,
    pub created: usize,
    pub active: Vec<DecisionRecord>,
    pub resurfaced_decision_id: Option<String>,
}

pub struct DecisionService {
    decisions: Arc<dyn DecisionRepository>,
    outcomes: Arc<dyn OutcomeRepository>,
    costs: Arc<dyn CostRepository>,
    settings: Arc<dyn SettingsRepository>,
    defaults: EngineDefaults,
}

impl DecisionService {
    pub fn new(
        decisions: Arc<dyn DecisionRepository>,
        outcomes: Arc<dyn OutcomeRepository>,
        costs: Arc<dyn CostRepository>,
        settings: Arc<dyn SettingsRepository>,
        defaults: EngineDefaults,
    ) -> Self {
        Self { decisions, outcomes, costs, settings, defaults }
    }

    /// Run the engine over a fresh order snapshot and persist the plan.
    pub async fn run_decision_engine(
        &self,
        merchant_id: &str,
        orders: &[OrderRecord],
        window_days: Option<u32>,
    ) -> Result<RunSummary, ServiceError> {
        let window_days = window_days.unwrap_or(self.defaults.window_days);
        let settings = self.settings.get_or_default(merchant_id, &self.defaults).await?;
        let costs = self.costs.lookup(merchant_id).await?;
        let ignored = self.decisions.list_ignored_unresurfaced(merchant_id).await?;
        let stats = self.outcomes.confidence_stats(merchant_id).await?;

        let plan = plan_run(RunInputs {
            run_id: Uuid::new_v4().to_string(),
            now: Utc::now(),
            window_days,
            settings: &settings,
            orders,
            costs: &costs,
            ignored: &ignored,
            stats: &stats,
        });

        self.decisions.persist_run(&plan).await?;

        let active: Vec<DecisionRecord> =
            plan.active().into_iter().cloned().collect();
        info!(
            merchant_id,
            run_id = %plan.run.id,
            order_count = plan.run.order_count,
            created = plan.records.len(),
            active = active.len(),
            "decision run persisted"
        );

        Ok(RunSummary {
            run_id: plan.run.id,
            order_count: plan.run.order_count,
            created: plan.records.len(),
            active,
            resurfaced_decision_id: plan.resurfaced_decision_id,
        })
    }

    /// Grade every due outcome against fresh orders. Returns how many
    /// evaluations were recorded.
    pub async fn evaluate_outcomes(
        &self,
        merchant_id: &str,
        orders: &[OrderRecord],
    ) -> Result<usize, ServiceError> {
        let now = Utc::now();
        let pending = self.outcomes.list_pending(merchant_id).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let settings = self.settings.get_or_default(merchant_id, &self.defaults).await?;
        let costs = self.costs.lookup(merchant_id).await?;

        let mut evaluated = 0usize;
        for outcome in &pending {
            let Some(decision) = self.decisions.find_by_id(&outcome.decision_id).await? else {
                continue;
            };
            let Some((post, classification)) = grade(
                outcome,
                &decision.evidence,
                orders,
                &costs,
                settings.shipping_cost,
                now,
            ) else {
                continue;
            };

            if self
                .outcomes
                .record_evaluation(&outcome.decision_id, &post, classification, now)
                .await?
            {
                info!(
                    merchant_id,
                    decision_id = %outcome.decision_id,
                    classification = %classification,
                    "outcome evaluated"
                );
                evaluated += 1;
            }
        }
        Ok(evaluated)
    }

    /// Mark a decision done and seed its outcome baseline from the
    /// evidence the merchant acted on.
    pub async fn mark_done(&self, decision_id: &str) -> Result<DecisionRecord, ServiceError> {
        let mut decision = self.find_decision(decision_id).await?;
        let now = Utc::now();
        decision.mark_done(now)?;
        self.decisions.save(&decision).await?;

        // Outcomes carry the rule-assigned confidence, so calibration
        // stats keep accumulating in the bucket the rule filled.
        let outcome = DecisionOutcome {
            decision_id: decision.id.clone(),
            merchant_id: decision.merchant_id.clone(),
            rule: decision.rule,
            confidence: decision.base_confidence,
            baseline: baseline_snapshot(&decision.evidence),
            post: None,
            classification: None,
            window_days: self.defaults.outcome_window_days,
            created_at: now,
            evaluated_at: None,
        };
        self.outcomes.seed(&outcome).await?;

        info!(decision_id = %decision.id, "decision marked done");
        Ok(decision)
    }

    pub async fn mark_ignored(&self, decision_id: &str) -> Result<DecisionRecord, ServiceError> {
        let mut decision = self.find_decision(decision_id).await?;
        decision.mark_ignored(Utc::now())?;
        self.decisions.save(&decision).await?;

        info!(decision_id = %decision.id, "decision marked ignored");
        Ok(decision)
    }

    pub async fn list_active(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionRecord>, ServiceError> {
        Ok(self.decisions.list_active(merchant_id).await?)
    }

    pub async fn import_costs(
        &self,
        merchant_id: &str,
        costs: Vec<VariantCost>,
    ) -> Result<u32, ServiceError> {
        let written = self.costs.upsert_batch(merchant_id, costs).await?;
        info!(merchant_id, written, "variant costs imported");
        Ok(written)
    }

    async fn find_decision(&self, decision_id: &str) -> Result<DecisionRecord, ServiceError> {
        self.decisions
            .find_by_id(decision_id)
            .await?
            .ok_or_else(|| ServiceError::DecisionNotFound(decision_id.to_string()))
    }
}
