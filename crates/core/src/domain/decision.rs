use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// The three detection rules the engine runs every pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    BestSellerLoss,
    ShippingThreshold,
    DiscountRefund,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestSellerLoss => "best_seller_loss",
            Self::ShippingThreshold => "shipping_threshold",
            Self::DiscountRefund => "discount_refund",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "best_seller_loss" => Ok(Self::BestSellerLoss),
            "shipping_threshold" => Ok(Self::ShippingThreshold),
            "discount_refund" => Ok(Self::DiscountRefund),
            other => Err(DomainError::InvariantViolation(format!("unknown rule kind `{other}`"))),
        }
    }
}

/// Stable identity of a finding across runs. A typed shape rather than an
/// ad hoc string so keys from different rules can never collide silently.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DecisionKey {
    Variant { rule: RuleKind, variant_id: String },
    Threshold { rule: RuleKind, threshold: u32 },
}

impl DecisionKey {
    pub fn rule(&self) -> RuleKind {
        match self {
            Self::Variant { rule, .. } | Self::Threshold { rule, .. } => *rule,
        }
    }
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variant { rule, variant_id } => write!(f, "{rule}:{variant_id}"),
            Self::Threshold { rule, threshold } => write!(f, "{rule}:{threshold}"),
        }
    }
}

impl FromStr for DecisionKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (rule_part, rest) = value.split_once(':').ok_or_else(|| {
            DomainError::InvariantViolation(format!("malformed decision key `{value}`"))
        })?;
        let rule = RuleKind::from_str(rule_part)?;

        match rule {
            RuleKind::ShippingThreshold => {
                let threshold = rest.parse::<u32>().map_err(|_| {
                    DomainError::InvariantViolation(format!(
                        "malformed threshold in decision key `{value}`"
                    ))
                })?;
                Ok(Self::Threshold { rule, threshold })
            }
            RuleKind::BestSellerLoss | RuleKind::DiscountRefund => {
                Ok(Self::Variant { rule, variant_id: rest.to_string() })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(DomainError::InvariantViolation(format!("unknown confidence `{other}`"))),
        }
    }
}

/// The exact figures that justify a candidate, persisted alongside it so
/// the recommendation stays explainable after the order window moves on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    VariantProfit {
        variant_id: String,
        sku: String,
        units_sold: u32,
        order_count: u32,
        revenue: Decimal,
        total_cost: Decimal,
        total_discounts: Decimal,
        refunded_revenue: Decimal,
        refunded_units: u32,
        shipping_cost: Decimal,
        net_profit: Decimal,
        margin_pct: f64,
    },
    ShippingCluster {
        threshold: u32,
        band_orders: u32,
        total_orders: u32,
        cluster_rate_pct: f64,
        shipping_cost: Decimal,
        band_revenue: Decimal,
        band_refunded: Decimal,
    },
}

/// Success-rate context attached when historical outcomes adjusted (or
/// confirmed) a candidate's confidence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationNote {
    pub success_rate: f64,
    pub samples: u32,
}

/// An unpersisted recommendation produced by one rule for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionCandidate {
    pub rule: RuleKind,
    pub key: DecisionKey,
    pub headline: String,
    pub action: String,
    pub reason: String,
    /// Projected monthly value, always non-negative; direction lives in
    /// the phrasing, not the number.
    pub impact: Decimal,
    pub confidence: Confidence,
    pub evidence: Evidence,
    pub context: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Active,
    Done,
    Ignored,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Done => "done",
            Self::Ignored => "ignored",
        }
    }
}

impl FromStr for DecisionStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            "ignored" => Ok(Self::Ignored),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown decision status `{other}`")))
            }
        }
    }
}

/// A persisted decision with its lifecycle timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub merchant_id: String,
    pub run_id: String,
    pub rule: RuleKind,
    pub key: DecisionKey,
    pub status: DecisionStatus,
    pub headline: String,
    pub action: String,
    pub reason: String,
    pub impact: Decimal,
    /// Confidence shown to the merchant, after calibration.
    pub confidence: Confidence,
    /// Confidence the rule itself assigned. Outcome history aggregates
    /// on this label so calibration cannot feed on its own output.
    pub base_confidence: Confidence,
    pub evidence: Evidence,
    pub context: Option<String>,
    pub calibration: Option<CalibrationNote>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ignored_at: Option<DateTime<Utc>>,
    pub resurfaced_at: Option<DateTime<Utc>>,
}

impl DecisionRecord {
    pub fn can_transition_to(&self, next: DecisionStatus) -> bool {
        matches!(
            (self.status, next),
            (DecisionStatus::Active, DecisionStatus::Done)
                | (DecisionStatus::Active, DecisionStatus::Ignored)
        )
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.can_transition_to(DecisionStatus::Done) {
            return Err(DomainError::InvalidDecisionTransition {
                from: self.status,
                to: DecisionStatus::Done,
            });
        }
        self.status = DecisionStatus::Done;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_ignored(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.can_transition_to(DecisionStatus::Ignored) {
            return Err(DomainError::InvalidDecisionTransition {
                from: self.status,
                to: DecisionStatus::Ignored,
            });
        }
        self.status = DecisionStatus::Ignored;
        self.ignored_at = Some(now);
        Ok(())
    }

    /// Record that a larger same-key finding displaced this ignored
    /// decision. Permitted at most once over the record's lifetime.
    pub fn mark_resurfaced(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != DecisionStatus::Ignored {
            return Err(DomainError::InvalidDecisionTransition {
                from: self.status,
                to: DecisionStatus::Ignored,
            });
        }
        if self.resurfaced_at.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "decision {} was already resurfaced",
                self.id
            )));
        }
        self.resurfaced_at = Some(now);
        Ok(())
    }
}

/// One engine invocation, so decision history groups by originating run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRun {
    pub id: String,
    pub merchant_id: String,
    pub created_at: DateTime<Utc>,
    pub order_count: u32,
    pub window_days: u32,
}
