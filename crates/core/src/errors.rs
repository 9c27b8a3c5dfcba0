use thiserror::Error;

use crate::domain::decision::DecisionStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid decision transition from {from:?} to {to:?}")]
    InvalidDecisionTransition { from: DecisionStatus, to: DecisionStatus },
    #[error("outcome for decision {0} has already been evaluated")]
    OutcomeAlreadyEvaluated(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}
