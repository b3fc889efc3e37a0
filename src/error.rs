//! Error types for KyroRete.
//!
//! All errors in KyroRete are strongly typed using thiserror.
//! Synchronous propagation errors always surface to the caller; only the
//! scheduler thread turns consequence failures into handler callbacks.

use std::time::Duration;

use thiserror::Error;

use crate::fact::FactHandle;

/// Errors raised by sinks while a fact is being propagated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FactError {
    #[error("Assertion failed: {reason}")]
    Assertion {
        reason: String,
    },

    #[error("Retraction failed: {reason}")]
    Retraction {
        reason: String,
    },

    #[error("No such fact handle: {handle}")]
    NoSuchFactHandle {
        handle: FactHandle,
    },
}

impl FactError {
    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(reason: impl Into<String>) -> Self {
        Self::Assertion {
            reason: reason.into(),
        }
    }

    /// Creates a retraction error.
    #[must_use]
    pub fn retraction(reason: impl Into<String>) -> Self {
        Self::Retraction {
            reason: reason.into(),
        }
    }
}

/// Errors raised by constraint and condition evaluators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Cannot compare {left} with {right}")]
    IncomparableValues {
        left: &'static str,
        right: &'static str,
    },

    #[error("Regex comparator requires a string value, got {actual}")]
    NotAString {
        actual: &'static str,
    },

    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },

    #[error("Evaluation failed: {reason}")]
    Failed {
        reason: String,
    },
}

impl EvaluationError {
    /// Creates a generic evaluation failure.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Error raised by a rule consequence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Consequence of rule '{rule}' failed: {reason}")]
pub struct ConsequenceError {
    pub rule: String,
    pub reason: String,
}

impl ConsequenceError {
    /// Creates a consequence error attributed to `rule`.
    #[must_use]
    pub fn new(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the scheduling service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Scheduler thread is no longer running")]
    Disconnected,

    #[error("Failed to spawn scheduler thread: {message}")]
    Spawn {
        message: String,
    },

    #[error("Delay {delay:?} cannot be scheduled")]
    DelayOutOfRange {
        delay: Duration,
    },
}

/// Top-level error type for KyroRete.
#[derive(Debug, Error)]
pub enum ReteError {
    #[error("Fact error: {0}")]
    Fact(#[from] FactError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Consequence error: {0}")]
    Consequence(#[from] ConsequenceError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Rule already registered: {name}")]
    DuplicateRule {
        name: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ReteError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `NoSuchFactHandle` error.
    #[must_use]
    pub fn no_such_fact_handle(handle: FactHandle) -> Self {
        Self::Fact(FactError::NoSuchFactHandle { handle })
    }

    /// Returns true if a sink rejected an assertion.
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Self::Fact(FactError::Assertion { .. }))
    }

    /// Returns true if a sink rejected a retraction.
    #[must_use]
    pub const fn is_retraction(&self) -> bool {
        matches!(self, Self::Fact(FactError::Retraction { .. }))
    }

    /// Returns true if a constraint or condition failed to evaluate.
    #[must_use]
    pub const fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }

    /// Returns true if a consequence failed.
    #[must_use]
    pub const fn is_consequence(&self) -> bool {
        matches!(self, Self::Consequence(_))
    }

    /// Returns true if the handle was unknown to the working memory.
    #[must_use]
    pub const fn is_no_such_fact_handle(&self) -> bool {
        matches!(self, Self::Fact(FactError::NoSuchFactHandle { .. }))
    }

    /// Returns true if a rule with the same name was already added.
    #[must_use]
    pub const fn is_duplicate_rule(&self) -> bool {
        matches!(self, Self::DuplicateRule { .. })
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for KyroRete operations.
pub type ReteResult<T> = Result<T, ReteError>;

pub(crate) fn lock_err(context: &'static str) -> ReteError {
    ReteError::internal(format!("poisoned lock: {context}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_error_messages() {
        let err = FactError::assertion("sink refused");
        assert!(format!("{err}").contains("sink refused"));

        let err = FactError::NoSuchFactHandle {
            handle: FactHandle::new(7),
        };
        assert!(format!("{err}").contains("fact:7"));
    }

    #[test]
    fn test_consequence_error_message() {
        let err = ConsequenceError::new("test-rule", "not enough cheese");
        let msg = format!("{err}");
        assert!(msg.contains("test-rule"));
        assert!(msg.contains("not enough cheese"));
    }

    #[test]
    fn test_rete_error_from_fact() {
        let err: ReteError = FactError::retraction("test").into();
        assert!(err.is_retraction());
        assert!(!err.is_assertion());
    }

    #[test]
    fn test_rete_error_from_evaluation() {
        let err: ReteError = EvaluationError::failed("boom").into();
        assert!(err.is_evaluation());
        assert!(format!("{err}").contains("boom"));
    }

    #[test]
    fn test_rete_error_no_such_handle() {
        let err = ReteError::no_such_fact_handle(FactHandle::new(3));
        assert!(err.is_no_such_fact_handle());
    }

    #[test]
    fn test_scheduler_error_queue_full() {
        let err = SchedulerError::QueueFull { capacity: 16 };
        assert!(format!("{err}").contains("16"));
    }

    #[test]
    fn test_lock_err_is_internal() {
        let err = lock_err("agenda");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("agenda"));
    }
}
