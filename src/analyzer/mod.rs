//! Page analyzer collaborator.
//!
//! The scoring algorithm lives in an external service; this module only
//! defines the contract the scheduler consumes and an HTTP client for it.

use crate::error::AnalysisError;
use crate::models::{PageAnalysis, ProgressEvent, SlotState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Forwards coarse-grained analyzer phases to the progress stream.
///
/// Step names are passed through verbatim.
#[derive(Debug, Clone)]
pub struct PhaseReporter {
    slot_index: usize,
    url: String,
    events: UnboundedSender<ProgressEvent>,
}

impl PhaseReporter {
    pub fn new(slot_index: usize, url: String, events: UnboundedSender<ProgressEvent>) -> Self {
        Self {
            slot_index,
            url,
            events,
        }
    }

    /// Emit a phase event for the slot. A closed receiver is ignored.
    pub fn report(&self, step: &str, detail: Option<&str>) {
        let _ = self.events.send(ProgressEvent {
            slot_index: self.slot_index,
            url: self.url.clone(),
            state: SlotState::Analyzing,
            step: Some(step.to_string()),
            step_detail: detail.map(str::to_string),
        });
    }
}

/// Scores a single page.
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    /// Analyze `url` within `timeout`. Implementations should stop work
    /// and return `AnalysisError::Cancelled` once `cancel` fires.
    async fn analyze(
        &self,
        url: &str,
        timeout: Duration,
        reporter: PhaseReporter,
        cancel: CancellationToken,
    ) -> std::result::Result<PageAnalysis, AnalysisError>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    score: f64,
    load_time_ms: u64,
    #[serde(default)]
    categories: BTreeMap<String, f64>,
    #[serde(default)]
    phases: Vec<PhaseEntry>,
}

#[derive(Debug, Deserialize)]
struct PhaseEntry {
    step: String,
    #[serde(default)]
    detail: Option<String>,
}

impl AnalyzeResponse {
    fn into_analysis(self) -> PageAnalysis {
        PageAnalysis {
            score: clamp_score(self.score),
            load_time_ms: self.load_time_ms,
            category_scores: self
                .categories
                .into_iter()
                .map(|(name, score)| (name, clamp_score(score)))
                .collect(),
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Client for a remote scoring service exposing `POST /analyze`.
pub struct HttpPageAnalyzer {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpPageAnalyzer {
    pub fn new(endpoint: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client for the scoring service")?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn request(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<AnalyzeResponse, AnalysisError> {
        let api_url = format!("{}/analyze", self.endpoint);
        let timeout_ms = timeout.as_millis() as u64;

        let response = self
            .http_client
            .post(&api_url)
            .timeout(timeout)
            .json(&AnalyzeRequest { url })
            .send()
            .await
            .map_err(|e| AnalysisError::from_reqwest(&e, timeout_ms))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Upstream(format!(
                "Scoring service error {}: {}",
                status, body
            )));
        }

        response.json::<AnalyzeResponse>().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout(timeout_ms)
            } else {
                AnalysisError::Upstream(format!("Failed to parse scoring response: {}", e))
            }
        })
    }
}

#[async_trait]
impl PageAnalyzer for HttpPageAnalyzer {
    async fn analyze(
        &self,
        url: &str,
        timeout: Duration,
        reporter: PhaseReporter,
        cancel: CancellationToken,
    ) -> std::result::Result<PageAnalysis, AnalysisError> {
        reporter.report("requesting", Some(&self.endpoint));

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            response = self.request(url, timeout) => response?,
        };

        for phase in &response.phases {
            reporter.report(&phase.step, phase.detail.as_deref());
        }

        debug!("Scored {}: {:.1}", url, response.score);
        Ok(response.into_analysis())
    }
}
