//! Run controller.
//!
//! Gates an audit run through `AwaitingValidation -> Validated -> Running ->
//! {Done, Cancelled}`. Structural and access errors are returned before any
//! slot work starts; per-page failures only ever land on their slot.

use crate::access::AccessGate;
use crate::analysis::aggregate;
use crate::analyzer::PageAnalyzer;
use crate::audit::scheduler::{AnalysisScheduler, ScheduleOutcome, SchedulerConfig};
use crate::audit::tracker::PageStateTracker;
use crate::error::{AuditError, Result};
use crate::models::{
    AggregateResult, AuditRequest, PageSlot, ProgressEvent, RunState, SlotState, ValidationEntry,
    ValidationReport, ValidationStatus, MAX_PATHS,
};
use crate::probe::ReachabilityProber;
use crate::urls;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// One audit of a domain. Owns its page slots.
#[derive(Debug)]
pub struct AuditRun {
    domain: String,
    paths: Vec<String>,
    state: RunState,
    tracker: Arc<PageStateTracker>,
    /// Held only until the access gate has been evaluated.
    credential: Option<String>,
    validation: Option<ValidationReport>,
    cancel: CancellationToken,
}

impl AuditRun {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Ordered snapshot of every slot.
    pub fn snapshot(&self) -> Vec<PageSlot> {
        self.tracker.snapshot()
    }

    pub fn completed_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|s| s.state == SlotState::Completed)
            .count()
    }

    /// Aggregate over the current snapshot; valid in partial and terminal states.
    pub fn aggregate(&self) -> AggregateResult {
        aggregate(&self.snapshot())
    }

    /// The most recent validation report, if validation has run.
    #[allow(dead_code)] // Accessor for embedding callers; the CLI prints the returned report
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        self.validation.as_ref()
    }

    /// Token that cancels validation probes and page analyses of this run.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Supply a new credential after an access denial.
    #[allow(dead_code)] // The CLI exits on denial instead of prompting again
    pub fn supply_credential(&mut self, credential: impl Into<String>) {
        self.credential = Some(credential.into());
    }

    fn rebuild_slots(&mut self) {
        self.tracker = Arc::new(PageStateTracker::new(build_slots(&self.domain, &self.paths)));
    }
}

fn build_slots(domain: &str, paths: &[String]) -> Vec<PageSlot> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| PageSlot::new(index, path.clone(), urls::compose(domain, path)))
        .collect()
}

/// Structural checks on the path list; returns trimmed paths.
fn check_paths(paths: &[String]) -> Result<Vec<String>> {
    if paths.is_empty() || paths.len() > MAX_PATHS {
        return Err(AuditError::Structural(format!(
            "Between 1 and {} paths are required, got {}",
            MAX_PATHS,
            paths.len()
        )));
    }

    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let trimmed = path.trim();
            if trimmed.is_empty() {
                Err(AuditError::Structural(format!("Path {} is blank", i + 1)))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

pub struct RunController {
    prober: Arc<dyn ReachabilityProber>,
    scheduler: AnalysisScheduler,
    gate: AccessGate,
}

impl RunController {
    pub fn new(
        prober: Arc<dyn ReachabilityProber>,
        analyzer: Arc<dyn PageAnalyzer>,
        gate: AccessGate,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        Self {
            prober,
            scheduler: AnalysisScheduler::new(analyzer, scheduler_config),
            gate,
        }
    }

    /// Accept a request that passes structural checks. No network activity.
    pub fn create_run(&self, request: AuditRequest) -> Result<AuditRun> {
        if !urls::is_valid_domain(&request.domain) {
            return Err(AuditError::Structural(format!(
                "Domain must be an absolute http(s) origin without a path: {}",
                request.domain.trim()
            )));
        }

        let domain = urls::canonical_domain(&request.domain);
        let paths = check_paths(&request.paths)?;
        let tracker = Arc::new(PageStateTracker::new(build_slots(&domain, &paths)));

        info!("Created audit run for {} with {} pages", domain, paths.len());

        Ok(AuditRun {
            domain,
            paths,
            state: RunState::AwaitingValidation,
            tracker,
            credential: Some(request.credential),
            validation: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the path list. The run must be re-validated afterwards.
    #[allow(dead_code)] // Interactive callers only; the CLI takes paths once
    pub fn edit_paths(&self, run: &mut AuditRun, paths: Vec<String>) -> Result<()> {
        self.expect_state(run, &[RunState::AwaitingValidation, RunState::Validated])?;

        run.paths = check_paths(&paths)?;
        run.rebuild_slots();
        run.validation = None;
        run.state = RunState::AwaitingValidation;
        Ok(())
    }

    /// Probe every page URL. The run becomes `Validated` only if every URL
    /// is reachable; otherwise it stays `AwaitingValidation`. A cancelled
    /// validation ends the run as `Cancelled`.
    #[instrument(skip_all, fields(domain = %run.domain))]
    pub async fn validate(
        &self,
        run: &mut AuditRun,
        events: &UnboundedSender<ProgressEvent>,
    ) -> Result<ValidationReport> {
        self.expect_state(run, &[RunState::AwaitingValidation])?;

        // Slots from an earlier attempt are terminal; start from fresh ones.
        if run.snapshot().iter().any(|s| s.state != SlotState::Pending) {
            run.rebuild_slots();
        }

        let slots = run.snapshot();
        for slot in &slots {
            let slot = run.tracker.mark_validating(slot.index)?;
            emit(events, &slot);
        }

        let targets: Vec<String> = slots.iter().map(|s| s.url.clone()).collect();
        let outcomes = urls::validate_all(self.prober.as_ref(), &targets, &run.cancel).await;

        let mut entries = Vec::with_capacity(slots.len());
        for (slot, outcome) in slots.iter().zip(outcomes) {
            let updated =
                run.tracker
                    .mark_validated(slot.index, outcome.reachable, outcome.error.clone())?;
            emit(events, &updated);

            entries.push(ValidationEntry {
                path: slot.path.clone(),
                url: slot.url.clone(),
                status: if outcome.reachable {
                    ValidationStatus::Valid
                } else {
                    ValidationStatus::Invalid
                },
                error: outcome.error,
            });
        }

        let report = ValidationReport { entries };
        if run.cancel.is_cancelled() {
            warn!("Validation of {} cancelled", run.domain);
            run.state = RunState::Cancelled;
        } else if report.all_valid() {
            info!("All {} pages reachable", report.entries.len());
            run.state = RunState::Validated;
        } else {
            for entry in report.failing() {
                warn!("Unreachable page {}: {:?}", entry.url, entry.error);
            }
        }

        run.validation = Some(report.clone());
        Ok(report)
    }

    /// Pass the access gate and move a validated run to `Running`.
    pub fn start(&self, run: &mut AuditRun) -> Result<()> {
        if run.state == RunState::AwaitingValidation {
            if let Some(report) = &run.validation {
                return Err(AuditError::ValidationFailed {
                    failing: report.failing(),
                });
            }
        }
        if run.state == RunState::Validated && run.cancel.is_cancelled() {
            run.state = RunState::Cancelled;
        }
        self.expect_state(run, &[RunState::Validated])?;

        let credential = run.credential.take().unwrap_or_default();
        if !self.gate.check(&credential) {
            warn!("Access denied for audit of {}", run.domain);
            return Err(AuditError::AccessDenied);
        }

        info!("Starting audit of {}", run.domain);
        run.state = RunState::Running;
        Ok(())
    }

    /// Analyze every page and return the final aggregate.
    ///
    /// Cancellation through [`AuditRun::cancel_handle`] ends the run as
    /// `Cancelled` with a valid aggregate over whatever completed.
    pub async fn execute(
        &self,
        run: &mut AuditRun,
        events: UnboundedSender<ProgressEvent>,
    ) -> Result<AggregateResult> {
        self.expect_state(run, &[RunState::Running])?;

        let outcome = self
            .scheduler
            .run(Arc::clone(&run.tracker), events, run.cancel.clone())
            .await;

        match outcome {
            Ok(ScheduleOutcome::Finished) => run.state = RunState::Done,
            Ok(ScheduleOutcome::Cancelled) => run.state = RunState::Cancelled,
            Err(e) => {
                run.state = RunState::Cancelled;
                return Err(e);
            }
        }

        let result = run.aggregate();
        info!(
            "Audit of {} {}: {} completed, {} failed",
            run.domain, run.state, result.completed_count, result.failed_count
        );
        Ok(result)
    }

    fn expect_state(&self, run: &AuditRun, allowed: &[RunState]) -> Result<()> {
        if allowed.contains(&run.state) {
            Ok(())
        } else {
            Err(AuditError::InvalidRunState {
                expected: allowed[0],
                actual: run.state,
            })
        }
    }
}

fn emit(events: &UnboundedSender<ProgressEvent>, slot: &PageSlot) {
    let _ = events.send(ProgressEvent {
        slot_index: slot.index,
        url: slot.url.clone(),
        state: slot.state,
        step: None,
        step_detail: slot.validation_error.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::PhaseReporter;
    use crate::error::AnalysisError;
    use crate::models::{PageAnalysis, ProbeOutcome};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    const SECRET: &str = "open-sesame";

    /// URLs containing "missing" are unreachable.
    struct StubProber;

    #[async_trait]
    impl ReachabilityProber for StubProber {
        async fn probe(&self, url: &str, _cancel: CancellationToken) -> ProbeOutcome {
            if url.contains("missing") {
                ProbeOutcome::unreachable(url, "HTTP 404")
            } else {
                ProbeOutcome::reachable(url)
            }
        }
    }

    struct ScoreTable {
        scores: HashMap<String, Option<f64>>,
        calls: AtomicUsize,
    }

    impl ScoreTable {
        fn new(scores: &[(&str, Option<f64>)]) -> Arc<Self> {
            Arc::new(Self {
                scores: scores.iter().map(|(u, s)| (u.to_string(), *s)).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageAnalyzer for ScoreTable {
        async fn analyze(
            &self,
            url: &str,
            _timeout: Duration,
            _reporter: PhaseReporter,
            _cancel: CancellationToken,
        ) -> std::result::Result<PageAnalysis, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scores.get(url).copied().flatten() {
                Some(score) => Ok(PageAnalysis {
                    score,
                    load_time_ms: 250,
                    category_scores: BTreeMap::new(),
                }),
                None => Err(AnalysisError::Upstream("scoring failed".to_string())),
            }
        }
    }

    fn controller(analyzer: Arc<ScoreTable>) -> RunController {
        RunController::new(
            Arc::new(StubProber),
            analyzer,
            AccessGate::new(Some(SECRET.to_string())),
            SchedulerConfig {
                concurrency: 2,
                page_timeout: Duration::from_secs(5),
                cancel_grace: Duration::from_millis(100),
            },
        )
    }

    fn request(paths: &[&str], credential: &str) -> AuditRequest {
        AuditRequest::new(
            "https://example.com",
            paths.iter().map(|p| p.to_string()).collect(),
            credential,
        )
    }

    #[tokio::test]
    async fn test_full_run_scenario() {
        let analyzer = ScoreTable::new(&[
            ("https://example.com/", Some(90.0)),
            ("https://example.com/about", Some(70.0)),
            ("https://example.com/pricing", Some(50.0)),
        ]);
        let controller = controller(analyzer);
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller
            .create_run(request(&["/", "/about", "/pricing"], SECRET))
            .unwrap();
        let report = controller.validate(&mut run, &tx).await.unwrap();
        assert!(report.all_valid());
        assert_eq!(run.state(), RunState::Validated);

        assert_ok!(controller.start(&mut run));
        assert_eq!(run.state(), RunState::Running);

        let result = controller.execute(&mut run, tx).await.unwrap();
        assert_eq!(run.state(), RunState::Done);
        assert_eq!(result.average_score, Some(70.0));
        assert_eq!(result.completed_count, 3);
        assert_eq!(result.failed_count, 0);
        assert_eq!(run.completed_count(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_path_blocks_run() {
        let analyzer = ScoreTable::new(&[]);
        let controller = controller(analyzer.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller
            .create_run(request(&["/", "/missing", "/about"], SECRET))
            .unwrap();
        let report = controller.validate(&mut run, &tx).await.unwrap();

        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.entries[0].status, ValidationStatus::Valid);
        assert_eq!(report.entries[1].status, ValidationStatus::Invalid);
        assert_eq!(report.entries[1].path, "/missing");
        assert_eq!(report.entries[2].status, ValidationStatus::Valid);
        assert_eq!(run.state(), RunState::AwaitingValidation);

        let err = controller.start(&mut run).unwrap_err();
        match err {
            AuditError::ValidationFailed { failing } => {
                assert_eq!(failing.len(), 1);
                assert_eq!(failing[0].url, "https://example.com/missing");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_err!(controller.execute(&mut run, tx).await);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_revalidation_after_editing_paths() {
        let analyzer = ScoreTable::new(&[
            ("https://example.com/", Some(80.0)),
            ("https://example.com/about", Some(60.0)),
        ]);
        let controller = controller(analyzer);
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller
            .create_run(request(&["/", "/missing"], SECRET))
            .unwrap();
        controller.validate(&mut run, &tx).await.unwrap();
        assert_eq!(run.snapshot()[1].state, SlotState::ValidationFailed);

        controller
            .edit_paths(&mut run, vec!["/".to_string(), "about".to_string()])
            .unwrap();
        assert!(run.validation_report().is_none());
        assert!(run.snapshot().iter().all(|s| s.state == SlotState::Pending));

        let report = controller.validate(&mut run, &tx).await.unwrap();
        assert!(report.all_valid());
        controller.start(&mut run).unwrap();

        let result = controller.execute(&mut run, tx).await.unwrap();
        assert_eq!(result.average_score, Some(70.0));
        assert_eq!(result.per_slot[1].url, "https://example.com/about");
    }

    #[tokio::test]
    async fn test_partial_success_is_a_valid_result() {
        let analyzer = ScoreTable::new(&[
            ("https://example.com/a", Some(80.0)),
            ("https://example.com/b", None),
            ("https://example.com/c", Some(60.0)),
            ("https://example.com/d", Some(100.0)),
            ("https://example.com/e", None),
        ]);
        let controller = controller(analyzer);
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller
            .create_run(request(&["/a", "/b", "/c", "/d", "/e"], SECRET))
            .unwrap();
        controller.validate(&mut run, &tx).await.unwrap();
        controller.start(&mut run).unwrap();
        let result = controller.execute(&mut run, tx).await.unwrap();

        assert_eq!(run.state(), RunState::Done);
        assert_eq!(result.completed_count, 3);
        assert_eq!(result.failed_count, 2);
        assert_eq!(result.average_score, Some(80.0));
        assert!(result.per_slot[1].error_text().is_some());
    }

    #[test]
    fn test_structural_rejections() {
        let controller = controller(ScoreTable::new(&[]));

        assert!(matches!(
            controller.create_run(request(&[], SECRET)),
            Err(AuditError::Structural(_))
        ));
        assert!(matches!(
            controller.create_run(request(&["/1", "/2", "/3", "/4", "/5", "/6"], SECRET)),
            Err(AuditError::Structural(_))
        ));
        assert!(matches!(
            controller.create_run(request(&["/", "   "], SECRET)),
            Err(AuditError::Structural(_))
        ));

        let bad_domain = AuditRequest::new("example.com/blog", vec!["/".to_string()], SECRET);
        assert!(matches!(
            controller.create_run(bad_domain),
            Err(AuditError::Structural(_))
        ));
    }

    #[test]
    fn test_duplicate_paths_are_independent_slots() {
        let controller = controller(ScoreTable::new(&[]));
        let run = controller
            .create_run(request(&["/about", "about", "/about"], SECRET))
            .unwrap();

        let slots = run.snapshot();
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|s| s.url == "https://example.com/about"));
        assert_eq!(slots[2].index, 2);
    }

    #[tokio::test]
    async fn test_start_requires_validation() {
        let controller = controller(ScoreTable::new(&[]));
        let mut run = controller.create_run(request(&["/"], SECRET)).unwrap();

        assert!(matches!(
            controller.start(&mut run),
            Err(AuditError::InvalidRunState {
                actual: RunState::AwaitingValidation,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_wrong_credential_is_denied() {
        let analyzer = ScoreTable::new(&[("https://example.com/", Some(50.0))]);
        let controller = controller(analyzer.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller.create_run(request(&["/"], "guess")).unwrap();
        controller.validate(&mut run, &tx).await.unwrap();

        assert!(matches!(controller.start(&mut run), Err(AuditError::AccessDenied)));
        assert_eq!(run.state(), RunState::Validated);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);

        run.supply_credential(SECRET);
        assert_ok!(controller.start(&mut run));
    }

    #[tokio::test]
    async fn test_cancel_before_execute_never_starts_pages() {
        let analyzer = ScoreTable::new(&[("https://example.com/", Some(50.0))]);
        let controller = controller(analyzer.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller.create_run(request(&["/", "/x"], SECRET)).unwrap();
        controller.validate(&mut run, &tx).await.unwrap();
        controller.start(&mut run).unwrap();

        run.cancel_handle().cancel();
        let result = controller.execute(&mut run, tx).await.unwrap();

        assert_eq!(run.state(), RunState::Cancelled);
        assert_eq!(result.average_score, None);
        assert_eq!(result.failed_count, 2);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
        assert!(result
            .per_slot
            .iter()
            .all(|s| s.analysis_error == Some(AnalysisError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_validation_ends_the_run() {
        let analyzer = ScoreTable::new(&[("https://example.com/", Some(50.0))]);
        let controller = controller(analyzer.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller.create_run(request(&["/", "/about"], SECRET)).unwrap();
        run.cancel_handle().cancel();

        let report = controller.validate(&mut run, &tx).await.unwrap();
        assert_eq!(report.entries.len(), 2);
        assert!(report
            .entries
            .iter()
            .all(|e| e.error.as_deref() == Some("Probe cancelled")));
        assert_eq!(run.state(), RunState::Cancelled);

        assert!(matches!(
            controller.edit_paths(&mut run, vec!["/about".to_string()]),
            Err(AuditError::InvalidRunState {
                actual: RunState::Cancelled,
                ..
            })
        ));
        assert_err!(controller.validate(&mut run, &tx).await);
        assert_err!(controller.start(&mut run));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_validation_blocks_start() {
        let controller = controller(ScoreTable::new(&[]));
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut run = controller.create_run(request(&["/"], SECRET)).unwrap();
        controller.validate(&mut run, &tx).await.unwrap();
        assert_eq!(run.state(), RunState::Validated);

        run.cancel_handle().cancel();
        assert!(matches!(
            controller.start(&mut run),
            Err(AuditError::InvalidRunState {
                actual: RunState::Cancelled,
                ..
            })
        ));
        assert_eq!(run.state(), RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_validation_events_cover_every_slot() {
        let controller = controller(ScoreTable::new(&[]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut run = controller
            .create_run(request(&["/", "/missing"], SECRET))
            .unwrap();
        controller.validate(&mut run, &tx).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((event.slot_index, event.state));
        }
        assert_eq!(
            events,
            vec![
                (0, SlotState::Validating),
                (1, SlotState::Validating),
                (0, SlotState::Validated),
                (1, SlotState::ValidationFailed),
            ]
        );
    }
}
