//! Reachability probing.
//!
//! A probe is a lightweight check that a URL responds. It is independent
//! of full content analysis and is invoked once per URL.

use crate::models::ProbeOutcome;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Checks whether a single URL responds.
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    /// Probe `url`. Implementations must return promptly once `cancel` fires.
    async fn probe(&self, url: &str, cancel: CancellationToken) -> ProbeOutcome;
}

/// Probes URLs over HTTP with a HEAD request, falling back to GET when
/// the server does not support HEAD.
pub struct HttpProber {
    http_client: reqwest::Client,
    timeout_seconds: u64,
}

impl HttpProber {
    pub fn new(timeout_seconds: u64, user_agent: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client for probes")?;

        Ok(Self {
            http_client,
            timeout_seconds,
        })
    }

    async fn request(&self, method: Method, url: &str) -> std::result::Result<StatusCode, String> {
        self.http_client
            .request(method, url)
            .send()
            .await
            .map(|response| response.status())
            .map_err(|e| {
                if e.is_timeout() {
                    format!("Timed out after {}s", self.timeout_seconds)
                } else if e.is_connect() {
                    format!("Cannot connect to {}", url)
                } else {
                    format!("Request failed: {}", e)
                }
            })
    }

    async fn check(&self, url: &str) -> ProbeOutcome {
        let status = match self.request(Method::HEAD, url).await {
            Ok(StatusCode::METHOD_NOT_ALLOWED) | Ok(StatusCode::NOT_IMPLEMENTED) => {
                debug!("HEAD not supported by {}, retrying with GET", url);
                self.request(Method::GET, url).await
            }
            other => other,
        };

        match status {
            Ok(status) => status_outcome(url, status),
            Err(message) => ProbeOutcome::unreachable(url, message),
        }
    }
}

/// Map a final HTTP status to a probe outcome.
fn status_outcome(url: &str, status: StatusCode) -> ProbeOutcome {
    if status.is_success() || status.is_redirection() {
        ProbeOutcome::reachable(url)
    } else {
        ProbeOutcome::unreachable(url, format!("HTTP {}", status.as_u16()))
    }
}

#[async_trait]
impl ReachabilityProber for HttpProber {
    async fn probe(&self, url: &str, cancel: CancellationToken) -> ProbeOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ProbeOutcome::unreachable(url, "Probe cancelled"),
            outcome = self.check(url) => outcome,
        }
    }
}
