//! Typed error kinds for the reconciliation engine.
//!
//! These correspond to the semantic error kinds the engine classifies
//! failures into (not to individual type names): transient failures are
//! retried next tick, not-found is treated as success for deletes,
//! conflicts are retried a bounded number of times, configuration errors
//! surface in status, and invariant violations are logged and skipped.
//! Errors of this type never escape a per-pool reconcile pass.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("optimistic concurrency conflict: {0}")]
    Conflict(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    /// Whether retrying the same operation on the next tick is expected
    /// to help, as opposed to requiring operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Transient(_) | EngineError::Conflict(_)
        )
    }
}

impl From<kube::Error> for EngineError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => EngineError::NotFound(resp.message.clone()),
            kube::Error::Api(resp) if resp.code == 409 => EngineError::Conflict(resp.message.clone()),
            kube::Error::Api(resp) if resp.code >= 400 && resp.code < 500 => {
                EngineError::Permanent(resp.message.clone())
            }
            other => EngineError::Transient(other.to_string()),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::Transient("boom".into()).is_retryable());
        assert!(EngineError::Conflict("conflict".into()).is_retryable());
        assert!(!EngineError::NotFound("x".into()).is_retryable());
        assert!(!EngineError::Permanent("x".into()).is_retryable());
        assert!(!EngineError::Configuration("x".into()).is_retryable());
        assert!(!EngineError::InvariantViolation("x".into()).is_retryable());
    }
}
