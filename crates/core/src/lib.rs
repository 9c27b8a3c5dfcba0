pub mod calibration;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod profit;
pub mod rules;
pub mod seasonality;

pub use calibration::{calibrate, BucketStats, Calibrated, ConfidenceStats, MIN_CALIBRATION_SAMPLES};
pub use config::{AppConfig, ConfigError, EngineDefaults, LoadOptions, MerchantSettings};
pub use domain::cost::{parse_cost_import, CostImportReport, CostLookup, CostSource, VariantCost};
pub use domain::decision::{
    CalibrationNote, Confidence, DecisionCandidate, DecisionKey, DecisionRecord, DecisionRun,
    DecisionStatus, Evidence, RuleKind,
};
pub use domain::order::{FinancialStatus, LineItem, OrderRecord, RefundLinePortion, RefundRecord};
pub use domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};
pub use engine::{
    plan_run, system_impact_floor, PlannedDecision, RunInputs, RunPlan, MAX_ACTIVE_DECISIONS,
    MIN_ORDERS_FOR_RUN,
};
pub use errors::DomainError;
pub use evaluator::{
    baseline_snapshot, classify, grade, post_snapshot, EvaluationScope, ScopedSample,
    MIN_EVALUATION_ORDERS,
};
pub use profit::{compute_variant_metrics, VariantProfitMetrics};
pub use rules::{detection_rules, DetectionRule, RuleContext};
pub use seasonality::weekly_pace_context;
