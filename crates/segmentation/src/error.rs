//! Error taxonomy for rule validation, evaluation and membership sync.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub type SegmentResult<T> = Result<T, SegmentError>;

/// A single problem with a single rule, detected before any query runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid operator '{operator}'")]
    InvalidOperator { operator: String },

    #[error("invalid cast '{cast_type}': {reason}")]
    InvalidCast { cast_type: String, reason: String },

    #[error("operator {operator} expects {expected} operand(s), got {actual}")]
    InvalidOperandCount {
        operator: String,
        expected: usize,
        actual: usize,
    },
}

/// A rule error tagged with the rule it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleViolation {
    pub rule_index: usize,
    pub field: String,
    pub error: RuleError,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule {} ({}): {}", self.rule_index, self.field, self.error)
    }
}

/// Failure of the backing store while executing a query or mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("rule set rejected: {}", join_violations(.0))]
    Validation(Vec<RuleViolation>),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("group {0} not found")]
    GroupNotFound(Uuid),

    #[error("player {0} not found")]
    PlayerNotFound(Uuid),
}

impl SegmentError {
    /// Violations carried by a validation failure, empty for other errors.
    pub fn violations(&self) -> &[RuleViolation] {
        match self {
            SegmentError::Validation(violations) => violations,
            _ => &[],
        }
    }
}

fn join_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
