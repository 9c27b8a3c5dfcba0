use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use marginscout_core::calibration::ConfidenceStats;
use marginscout_core::config::{EngineDefaults, MerchantSettings};
use marginscout_core::domain::cost::{CostLookup, VariantCost};
use marginscout_core::domain::decision::DecisionRecord;
use marginscout_core::domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};
use marginscout_core::engine::RunPlan;

pub mod cost;
pub mod decision;
pub mod memory;
pub mod outcome;
pub mod settings;

pub use cost::SqlCostRepository;
pub use decision::SqlDecisionRepository;
pub use memory::{
    InMemoryCostRepository, InMemoryDecisionRepository, InMemoryOutcomeRepository,
    InMemorySettingsRepository,
};
pub use outcome::SqlOutcomeRepository;
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DecisionRepository: Send + Sync {
    /// Persist one run atomically: the run row, every planned decision,
    /// superseding the previous active set, and the resurfaced marker.
    async fn persist_run(&self, plan: &RunPlan) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<DecisionRecord>, RepositoryError>;

    async fn list_active(&self, merchant_id: &str)
        -> Result<Vec<DecisionRecord>, RepositoryError>;

    /// Ignored decisions that have never been resurfaced, for the
    /// resurfacing check at run time.
    async fn list_ignored_unresurfaced(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionRecord>, RepositoryError>;

    async fn save(&self, record: &DecisionRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OutcomeRepository: Send + Sync {
    /// Seed a baseline for a newly done decision. A no-op when an
    /// outcome row already exists.
    async fn seed(&self, outcome: &DecisionOutcome) -> Result<(), RepositoryError>;

    async fn find_by_decision(
        &self,
        decision_id: &str,
    ) -> Result<Option<DecisionOutcome>, RepositoryError>;

    /// Outcomes with no evaluation yet, regardless of whether the
    /// window has elapsed; the evaluator applies the due-date check.
    async fn list_pending(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionOutcome>, RepositoryError>;

    /// Record an evaluation, guarded so a second call can never
    /// overwrite the first. Returns whether a row was updated.
    async fn record_evaluation(
        &self,
        decision_id: &str,
        post: &MetricsSnapshot,
        classification: OutcomeClass,
        evaluated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Historical success counts per (rule, confidence) bucket over
    /// evaluated outcomes.
    async fn confidence_stats(
        &self,
        merchant_id: &str,
    ) -> Result<ConfidenceStats, RepositoryError>;
}

#[async_trait]
pub trait CostRepository: Send + Sync {
    /// Upsert a batch of costs, honoring source precedence: an existing
    /// higher-precedence entry is never overwritten.
    async fn upsert_batch(
        &self,
        merchant_id: &str,
        costs: Vec<VariantCost>,
    ) -> Result<u32, RepositoryError>;

    async fn lookup(&self, merchant_id: &str) -> Result<CostLookup, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_or_default(
        &self,
        merchant_id: &str,
        defaults: &EngineDefaults,
    ) -> Result<MerchantSettings, RepositoryError>;

    async fn save(&self, settings: &MerchantSettings) -> Result<(), RepositoryError>;
}
