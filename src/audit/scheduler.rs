//! Analysis scheduler.
//!
//! Drives every analysis-eligible slot through `Analyzing` to a terminal
//! state with at most `concurrency` analyses in flight. Each slot is owned
//! by exactly one worker task, which is the only writer of that slot.

use crate::analyzer::{PageAnalyzer, PhaseReporter};
use crate::audit::tracker::PageStateTracker;
use crate::error::{AnalysisError, AuditError, Result};
use crate::models::{PageAnalysis, PageSlot, ProgressEvent, SlotState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of analyses in flight (K). Must be at least 1.
    pub concurrency: usize,
    /// Hard upper bound for one page analysis.
    pub page_timeout: Duration,
    /// Time an analyzing slot gets to honour cancellation before it is abandoned.
    pub cancel_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            page_timeout: Duration::from_secs(60),
            cancel_grace: Duration::from_secs(2),
        }
    }
}

/// How a scheduling pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Every eligible slot reached a terminal state.
    Finished,
    /// Cancellation was requested; remaining slots were failed as cancelled.
    Cancelled,
}

pub struct AnalysisScheduler {
    analyzer: Arc<dyn PageAnalyzer>,
    config: SchedulerConfig,
}

impl AnalysisScheduler {
    pub fn new(analyzer: Arc<dyn PageAnalyzer>, config: SchedulerConfig) -> Self {
        Self { analyzer, config }
    }

    /// Analyze every `Validated` slot in `tracker`.
    ///
    /// Per-slot failures are recorded on the slot. Only an illegal state
    /// transition aborts the pass, in which case sibling work is cancelled
    /// and the violation is returned.
    #[instrument(skip_all, fields(slots = tracker.len(), concurrency = self.config.concurrency))]
    pub async fn run(
        &self,
        tracker: Arc<PageStateTracker>,
        events: UnboundedSender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<ScheduleOutcome> {
        let eligible: Vec<PageSlot> = tracker
            .snapshot()
            .into_iter()
            .filter(|slot| slot.state == SlotState::Validated)
            .collect();

        info!("Scheduling {} page analyses", eligible.len());

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let abort = cancel.child_token();
        let mut workers = JoinSet::new();

        for slot in eligible {
            let worker = SlotWorker {
                index: slot.index,
                url: slot.url,
                analyzer: Arc::clone(&self.analyzer),
                config: self.config.clone(),
                tracker: Arc::clone(&tracker),
                events: events.clone(),
                cancel: abort.clone(),
            };
            workers.spawn(worker.run(Arc::clone(&semaphore)));
        }

        let mut violation: Option<AuditError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Aborting run: {}", e);
                    abort.cancel();
                    violation.get_or_insert(e);
                }
                Err(join_error) if join_error.is_panic() => {
                    std::panic::resume_unwind(join_error.into_panic());
                }
                Err(join_error) => {
                    warn!("Analysis worker was aborted: {}", join_error);
                }
            }
        }

        if let Some(e) = violation {
            return Err(e);
        }

        if cancel.is_cancelled() {
            info!("Analysis cancelled");
            Ok(ScheduleOutcome::Cancelled)
        } else {
            info!("All page analyses finished");
            Ok(ScheduleOutcome::Finished)
        }
    }
}

/// Owns one slot for the duration of its analysis.
struct SlotWorker {
    index: usize,
    url: String,
    analyzer: Arc<dyn PageAnalyzer>,
    config: SchedulerConfig,
    tracker: Arc<PageStateTracker>,
    events: UnboundedSender<ProgressEvent>,
    cancel: CancellationToken,
}

impl SlotWorker {
    async fn run(self, semaphore: Arc<Semaphore>) -> Result<()> {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
        };

        // The cancellation check and the move to Analyzing happen under one
        // tracker lock, so a pending slot never starts once cancelled.
        let slot = match &permit {
            Some(_) => self
                .tracker
                .begin_analysis(self.index, || self.cancel.is_cancelled())?,
            None => self.tracker.mark_failed(self.index, AnalysisError::Cancelled)?,
        };

        if slot.state != SlotState::Analyzing {
            debug!("Slot {} cancelled before start", self.index);
            self.emit(&slot, None);
            return Ok(());
        }
        self.emit(&slot, Some("started"));

        let result = self.analyze().await;

        let slot = match result {
            Ok(analysis) => self.tracker.mark_completed(self.index, analysis)?,
            Err(e) => {
                warn!("Analysis of {} failed: {}", self.url, e);
                self.tracker.mark_failed(self.index, e)?
            }
        };
        self.emit(&slot, None);
        Ok(())
    }

    async fn analyze(&self) -> std::result::Result<PageAnalysis, AnalysisError> {
        let timeout = self.config.page_timeout;
        let started = Instant::now();
        let reporter = PhaseReporter::new(self.index, self.url.clone(), self.events.clone());
        let page_cancel = self.cancel.child_token();

        let mut analysis = self
            .analyzer
            .analyze(&self.url, timeout, reporter, page_cancel);

        tokio::select! {
            biased;
            result = tokio::time::timeout(timeout, &mut analysis) => {
                result.unwrap_or(Err(AnalysisError::Timeout(timeout.as_millis() as u64)))
            }
            _ = self.cancel.cancelled() => {
                let grace = self
                    .config
                    .cancel_grace
                    .min(timeout.saturating_sub(started.elapsed()));
                if tokio::time::timeout(grace, &mut analysis).await.is_err() {
                    warn!(
                        "Analyzer did not stop within {:?} for {}; abandoning it",
                        grace, self.url
                    );
                }
                Err(AnalysisError::Cancelled)
            }
        }
    }

    fn emit(&self, slot: &PageSlot, step: Option<&str>) {
        let _ = self.events.send(ProgressEvent {
            slot_index: slot.index,
            url: slot.url.clone(),
            state: slot.state,
            step: step.map(str::to_string),
            step_detail: slot.error_text(),
        });
    }
}
