//! Error taxonomy for the request lifecycle engine
//!
//! Each variant maps to one caller-visible failure class: validation errors
//! are correctable input, invalid transitions are status-rule violations and
//! never retried, conflicts are optimistic-concurrency races the caller
//! should re-read and retry.

use crate::request::RequestStatus;

/// Error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed policy or input — caller's fault, recoverable by correcting input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Status rule violation — surfaced to the caller, never retried automatically
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// Operation not permitted in the current lifecycle stage
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Optimistic-concurrency race — caller should re-read and retry
    #[error("conflict on {request_id}: expected status {expected}, found {actual}")]
    Conflict {
        request_id: String,
        expected: RequestStatus,
        actual: RequestStatus,
    },

    /// Unknown request, policy or team
    #[error("not found: {0}")]
    NotFound(String),

    /// Failure in the persistence collaborator
    #[error("store error: {0}")]
    Store(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Whether the caller can resolve this error by re-reading and retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_retryable() {
        let err = EngineError::Conflict {
            request_id: "CST-2026-0001".to_string(),
            expected: RequestStatus::Triaged,
            actual: RequestStatus::Assigned,
        };
        assert!(err.is_retryable());
        assert!(!EngineError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_statuses() {
        let err = EngineError::InvalidTransition {
            from: RequestStatus::New,
            to: RequestStatus::Resolved,
        };
        assert_eq!(err.to_string(), "invalid transition from new to resolved");
    }
}
