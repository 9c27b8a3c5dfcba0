use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use marginscout_core::calibration::ConfidenceStats;
use marginscout_core::config::{EngineDefaults, MerchantSettings};
use marginscout_core::domain::cost::{CostLookup, VariantCost};
use marginscout_core::domain::decision::{DecisionRecord, DecisionStatus};
use marginscout_core::domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};
use marginscout_core::engine::RunPlan;

use super::{
    CostRepository, DecisionRepository, OutcomeRepository, RepositoryError, SettingsRepository,
};

type SettingsMap = Arc<RwLock<HashMap<String, MerchantSettings>>>;

#[derive(Default)]
pub struct InMemoryDecisionRepository {
    decisions: RwLock<HashMap<String, DecisionRecord>>,
    settings: SettingsMap,
}

impl InMemoryDecisionRepository {
    /// Wire the repository to a settings repository's map, so a
    /// persisted run updates the merchant state the way the SQL
    /// transaction does.
    pub fn sharing_settings(settings: &InMemorySettingsRepository) -> Self {
        Self { decisions: RwLock::default(), settings: Arc::clone(&settings.settings) }
    }
}

#[async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn persist_run(&self, plan: &RunPlan) -> Result<(), RepositoryError> {
        let mut decisions = self.decisions.write().await;

        for decision in decisions.values_mut() {
            if decision.merchant_id == plan.run.merchant_id
                && decision.status == DecisionStatus::Active
            {
                decision.status = DecisionStatus::Done;
                decision.completed_at = Some(plan.run.created_at);
            }
        }
        for record in &plan.records {
            decisions.insert(record.id.clone(), record.clone());
        }
        if let Some(resurfaced_id) = &plan.resurfaced_decision_id {
            if let Some(decision) = decisions.get_mut(resurfaced_id) {
                if decision.status == DecisionStatus::Ignored && decision.resurfaced_at.is_none() {
                    decision.resurfaced_at = Some(plan.run.created_at);
                }
            }
        }
        let mut settings = self.settings.write().await;
        settings.insert(plan.settings.merchant_id.clone(), plan.settings.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DecisionRecord>, RepositoryError> {
        let decisions = self.decisions.read().await;
        Ok(decisions.get(id).cloned())
    }

    async fn list_active(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionRecord>, RepositoryError> {
        let decisions = self.decisions.read().await;
        let mut active: Vec<DecisionRecord> = decisions
            .values()
            .filter(|d| d.merchant_id == merchant_id && d.status == DecisionStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.impact.cmp(&a.impact).then_with(|| a.key.to_string().cmp(&b.key.to_string()))
        });
        Ok(active)
    }

    async fn list_ignored_unresurfaced(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionRecord>, RepositoryError> {
        let decisions = self.decisions.read().await;
        let mut ignored: Vec<DecisionRecord> = decisions
            .values()
            .filter(|d| {
                d.merchant_id == merchant_id
                    && d.status == DecisionStatus::Ignored
                    && d.resurfaced_at.is_none()
            })
            .cloned()
            .collect();
        ignored.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(ignored)
    }

    async fn save(&self, record: &DecisionRecord) -> Result<(), RepositoryError> {
        let mut decisions = self.decisions.write().await;
        decisions.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOutcomeRepository {
    outcomes: RwLock<HashMap<String, DecisionOutcome>>,
}

#[async_trait]
impl OutcomeRepository for InMemoryOutcomeRepository {
    async fn seed(&self, outcome: &DecisionOutcome) -> Result<(), RepositoryError> {
        let mut outcomes = self.outcomes.write().await;
        outcomes.entry(outcome.decision_id.clone()).or_insert_with(|| outcome.clone());
        Ok(())
    }

    async fn find_by_decision(
        &self,
        decision_id: &str,
    ) -> Result<Option<DecisionOutcome>, RepositoryError> {
        let outcomes = self.outcomes.read().await;
        Ok(outcomes.get(decision_id).cloned())
    }

    async fn list_pending(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionOutcome>, RepositoryError> {
        let outcomes = self.outcomes.read().await;
        let mut pending: Vec<DecisionOutcome> = outcomes
            .values()
            .filter(|o| o.merchant_id == merchant_id && !o.is_evaluated())
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.decision_id.cmp(&b.decision_id))
        });
        Ok(pending)
    }

    async fn record_evaluation(
        &self,
        decision_id: &str,
        post: &MetricsSnapshot,
        classification: OutcomeClass,
        evaluated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut outcomes = self.outcomes.write().await;
        let Some(outcome) = outcomes.get_mut(decision_id) else {
            return Ok(false);
        };
        if outcome.is_evaluated() {
            return Ok(false);
        }
        outcome.post = Some(*post);
        outcome.classification = Some(classification);
        outcome.evaluated_at = Some(evaluated_at);
        Ok(true)
    }

    async fn confidence_stats(
        &self,
        merchant_id: &str,
    ) -> Result<ConfidenceStats, RepositoryError> {
        let outcomes = self.outcomes.read().await;
        let mut stats = ConfidenceStats::new();
        for outcome in outcomes.values() {
            if outcome.merchant_id != merchant_id {
                continue;
            }
            if let Some(classification) = outcome.classification {
                stats.record(
                    outcome.rule,
                    outcome.confidence,
                    classification == OutcomeClass::Improved,
                );
            }
        }
        Ok(stats)
    }
}

#[derive(Default)]
pub struct InMemoryCostRepository {
    costs: RwLock<HashMap<String, CostLookup>>,
}

#[async_trait]
impl CostRepository for InMemoryCostRepository {
    async fn upsert_batch(
        &self,
        merchant_id: &str,
        costs: Vec<VariantCost>,
    ) -> Result<u32, RepositoryError> {
        let mut store = self.costs.write().await;
        let lookup = store.entry(merchant_id.to_string()).or_default();
        let mut written = 0u32;
        for cost in costs {
            let blocked = lookup
                .get(&cost.variant_id)
                .is_some_and(|existing| existing.source.precedence() > cost.source.precedence());
            if !blocked {
                lookup.upsert(cost);
                written += 1;
            }
        }
        Ok(written)
    }

    async fn lookup(&self, merchant_id: &str) -> Result<CostLookup, RepositoryError> {
        let store = self.costs.read().await;
        Ok(store.get(merchant_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    settings: SettingsMap,
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get_or_default(
        &self,
        merchant_id: &str,
        defaults: &EngineDefaults,
    ) -> Result<MerchantSettings, RepositoryError> {
        let settings = self.settings.read().await;
        Ok(settings
            .get(merchant_id)
            .cloned()
            .unwrap_or_else(|| MerchantSettings::new(merchant_id, defaults)))
    }

    async fn save(&self, settings: &MerchantSettings) -> Result<(), RepositoryError> {
        let mut store = self.settings.write().await;
        store.insert(settings.merchant_id.clone(), settings.clone());
        Ok(())
    }
}
