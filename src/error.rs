//! Error types for the audit orchestrator.
//!
//! Run-level errors (`AuditError`) are returned to the caller before or
//! instead of slot work. Per-page failures (`AnalysisError`) are recorded on
//! the slot they belong to and never unwind the run.

use crate::models::{RunState, SlotState, ValidationEntry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Malformed request: bad domain, wrong path count, blank path.
    #[error("Invalid audit request: {0}")]
    Structural(String),

    /// One or more URLs failed the reachability check.
    #[error("{} of the requested pages are unreachable", failing.len())]
    ValidationFailed { failing: Vec<ValidationEntry> },

    /// Credential did not match the configured shared secret.
    #[error("Access denied: invalid access key")]
    AccessDenied,

    #[error("Operation requires run state {expected}, but run is {actual}")]
    InvalidRunState { expected: RunState, actual: RunState },

    /// A slot was driven through an illegal transition.
    #[error("Illegal transition for slot {slot}: {from} -> {to}")]
    InvariantViolation {
        slot: usize,
        from: SlotState,
        to: SlotState,
    },

    #[error("No page slot with index {0}")]
    UnknownSlot(usize),
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Classified failure of a single page analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AnalysisError {
    /// Elapsed budget in milliseconds.
    #[error("Analysis timed out after {}", format_millis(.0))]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Classify a reqwest error the same way for every HTTP collaborator.
    pub fn from_reqwest(err: &reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            AnalysisError::Timeout(timeout_ms)
        } else if err.is_connect() || err.is_request() {
            AnalysisError::Network(err.to_string())
        } else {
            AnalysisError::Upstream(err.to_string())
        }
    }
}

/// Render milliseconds as seconds without losing sub-second budgets.
fn format_millis(ms: &u64) -> String {
    let ms = *ms;
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_display() {
        assert_eq!(
            AnalysisError::Timeout(30_000).to_string(),
            "Analysis timed out after 30s"
        );
        assert_eq!(
            AnalysisError::Timeout(250).to_string(),
            "Analysis timed out after 0.25s"
        );
        assert_eq!(AnalysisError::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_analysis_error_serializes_with_kind() {
        let json = serde_json::to_string(&AnalysisError::Upstream("502".to_string())).unwrap();
        assert_eq!(json, r#"{"kind":"upstream","message":"502"}"#);
    }

    #[test]
    fn test_invariant_violation_message() {
        let err = AuditError::InvariantViolation {
            slot: 2,
            from: SlotState::ValidationFailed,
            to: SlotState::Analyzing,
        };
        assert_eq!(
            err.to_string(),
            "Illegal transition for slot 2: validation_failed -> analyzing"
        );
    }
}
