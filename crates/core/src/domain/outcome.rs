use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::decision::{Confidence, RuleKind};
use crate::errors::DomainError;

/// The three figures an outcome is graded on, captured at baseline and
/// again after the evaluation window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub profit_per_order: Decimal,
    pub refund_rate_pct: f64,
    pub shipping_loss_per_order: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Improved,
    Worsened,
    NoChange,
}

impl OutcomeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improved => "improved",
            Self::Worsened => "worsened",
            Self::NoChange => "no_change",
        }
    }
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeClass {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "improved" => Ok(Self::Improved),
            "worsened" => Ok(Self::Worsened),
            "no_change" => Ok(Self::NoChange),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown outcome class `{other}`")))
            }
        }
    }
}

/// Post-action grading record, 1:1 with a done decision. `evaluated_at`
/// is set exactly once; a populated value permanently freezes the row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision_id: String,
    pub merchant_id: String,
    pub rule: RuleKind,
    pub confidence: Confidence,
    pub baseline: MetricsSnapshot,
    pub post: Option<MetricsSnapshot>,
    pub classification: Option<OutcomeClass>,
    pub window_days: u32,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl DecisionOutcome {
    pub fn is_evaluated(&self) -> bool {
        self.evaluated_at.is_some()
    }

    /// The moment the evaluation window closes and grading becomes due.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::days(i64::from(self.window_days))
    }

    pub fn record_evaluation(
        &mut self,
        post: MetricsSnapshot,
        classification: OutcomeClass,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.is_evaluated() {
            return Err(DomainError::OutcomeAlreadyEvaluated(self.decision_id.clone()));
        }
        self.post = Some(post);
        self.classification = Some(classification);
        self.evaluated_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{DecisionOutcome, MetricsSnapshot, OutcomeClass};
    use crate::domain::decision::{Confidence, RuleKind};

    fn outcome() -> DecisionOutcome {
        DecisionOutcome {
            decision_id: "dec-1".to_string(),
            merchant_id: "shop-1".to_string(),
            rule: RuleKind::BestSellerLoss,
            confidence: Confidence::Medium,
            baseline: MetricsSnapshot {
                profit_per_order: Decimal::new(-26, 2),
                refund_rate_pct: 12.0,
                shipping_loss_per_order: Decimal::new(110, 2),
            },
            post: None,
            classification: None,
            window_days: 30,
            created_at: Utc::now(),
            evaluated_at: None,
        }
    }

    #[test]
    fn due_at_is_window_days_after_creation() {
        let outcome = outcome();
        assert_eq!(outcome.due_at(), outcome.created_at + Duration::days(30));
    }

    #[test]
    fn evaluation_is_recorded_exactly_once() {
        let mut outcome = outcome();
        let post = MetricsSnapshot {
            profit_per_order: Decimal::new(18, 2),
            refund_rate_pct: 6.0,
            shipping_loss_per_order: Decimal::new(60, 2),
        };

        outcome.record_evaluation(post, OutcomeClass::Improved, Utc::now()).expect("first");
        assert!(outcome.is_evaluated());

        let error = outcome
            .record_evaluation(post, OutcomeClass::Worsened, Utc::now())
            .expect_err("second evaluation must be rejected");
        assert!(matches!(error, crate::errors::DomainError::OutcomeAlreadyEvaluated(_)));
        assert_eq!(outcome.classification, Some(OutcomeClass::Improved));
    }
}
