//! Data models for the site auditor.
//!
//! This module contains the core data structures shared by the run
//! controller, the scheduler, the aggregator and the report generator.

use crate::error::AnalysisError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of page paths accepted in one audit request.
pub const MAX_PATHS: usize = 5;

/// A request to audit a bounded list of pages on one domain.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    /// Absolute http(s) origin, e.g. `https://example.com`.
    pub domain: String,
    /// Page paths relative to the domain, in request order.
    pub paths: Vec<String>,
    /// Access key checked before analysis is scheduled.
    pub credential: String,
}

impl AuditRequest {
    pub fn new(domain: impl Into<String>, paths: Vec<String>, credential: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            paths,
            credential: credential.into(),
        }
    }
}

/// Lifecycle state of one page slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Created, not yet probed.
    Pending,
    /// Reachability probe in flight.
    Validating,
    /// Probe failed. Terminal.
    ValidationFailed,
    /// Probe succeeded; eligible for analysis.
    Validated,
    /// Page analysis in flight.
    Analyzing,
    /// Analysis finished with a score. Terminal.
    Completed,
    /// Analysis failed or was cancelled. Terminal.
    Failed,
}

impl SlotState {
    /// Returns true when no further transitions can occur.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SlotState::ValidationFailed | SlotState::Completed | SlotState::Failed
        )
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(self, next: SlotState) -> bool {
        use SlotState::*;
        matches!(
            (self, next),
            (Pending, Validating)
                | (Validating, Validated)
                | (Validating, ValidationFailed)
                | (Validated, Analyzing)
                | (Validated, Failed)
                | (Analyzing, Completed)
                | (Analyzing, Failed)
        )
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Pending => "pending",
            SlotState::Validating => "validating",
            SlotState::ValidationFailed => "validation_failed",
            SlotState::Validated => "validated",
            SlotState::Analyzing => "analyzing",
            SlotState::Completed => "completed",
            SlotState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Run-level gating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    AwaitingValidation,
    Validated,
    Running,
    Cancelled,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::AwaitingValidation => write!(f, "awaiting_validation"),
            RunState::Validated => write!(f, "validated"),
            RunState::Running => write!(f, "running"),
            RunState::Cancelled => write!(f, "cancelled"),
            RunState::Done => write!(f, "done"),
        }
    }
}

/// One page's analysis unit. The index is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSlot {
    /// Position in the request's path list.
    pub index: usize,
    /// Path as given in the request (trimmed).
    pub path: String,
    /// Absolute URL composed from domain and path.
    pub url: String,
    pub state: SlotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_scores: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<AnalysisError>,
}

impl PageSlot {
    /// Creates a fresh slot in the `Pending` state.
    pub fn new(index: usize, path: String, url: String) -> Self {
        Self {
            index,
            path,
            url,
            state: SlotState::Pending,
            validation_error: None,
            score: None,
            load_time_ms: None,
            category_scores: BTreeMap::new(),
            analysis_error: None,
        }
    }

    /// Returns a short error description for failed slots.
    pub fn error_text(&self) -> Option<String> {
        match self.state {
            SlotState::ValidationFailed => self.validation_error.clone(),
            SlotState::Failed => self.analysis_error.as_ref().map(|e| e.to_string()),
            _ => None,
        }
    }
}

/// Result of a single reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn reachable(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reachable: true,
            error: None,
        }
    }

    pub fn unreachable(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reachable: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

/// One row of the validation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub path: String,
    pub url: String,
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered per-path validation outcome, one entry per requested path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub entries: Vec<ValidationEntry>,
}

impl ValidationReport {
    /// Returns true when every entry is valid.
    pub fn all_valid(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.status == ValidationStatus::Valid)
    }

    /// Returns the invalid entries, in request order.
    pub fn failing(&self) -> Vec<ValidationEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == ValidationStatus::Invalid)
            .cloned()
            .collect()
    }
}

/// Progress notification emitted on every slot transition and phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub slot_index: usize,
    pub url: String,
    pub state: SlotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_detail: Option<String>,
}

/// Successful result contract of the external page analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    /// Overall visibility score, 0-100.
    pub score: f64,
    pub load_time_ms: u64,
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
}

/// Domain-level rollup computed from Completed slots only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Mean score over Completed slots; absent when none completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,
    pub completed_count: usize,
    /// Includes validation failures and cancelled slots.
    pub failed_count: usize,
    /// Mean of each category over the Completed slots that report it.
    pub category_averages: BTreeMap<String, f64>,
    pub per_slot: Vec<PageSlot>,
}

/// Metadata about the audit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Audited domain origin.
    pub domain: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Final run state.
    pub run_state: RunState,
    /// Number of pages requested.
    pub pages_requested: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete site audit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub metadata: ReportMetadata,
    pub aggregate: AggregateResult,
}
