//! SiteAuditor - multi-page visibility auditor
//!
//! A CLI tool that validates a bounded list of pages on one domain,
//! scores each page through an external scoring service and produces
//! per-page and domain-level results.
//!
//! Exit codes:
//!   0 - Success (every page analyzed)
//!   1 - Runtime error (bad request, access denied, cancelled validation, I/O, etc.)
//!   2 - One or more pages are unreachable; nothing was analyzed
//!   3 - Audit finished, but one or more pages failed or were cancelled

mod access;
mod analysis;
mod analyzer;
mod audit;
mod cli;
mod config;
mod error;
mod models;
mod probe;
mod report;
mod urls;

use access::AccessGate;
use analyzer::HttpPageAnalyzer;
use anyhow::{Context, Result};
use audit::{AuditRun, RunController};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use models::{AuditReport, AuditRequest, ProgressEvent, ReportMetadata, RunState, SlotState};
use probe::HttpProber;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so the config can enable verbose output
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("SiteAuditor v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", source);
    debug!("Arguments: {:?}", args);

    // Run the audit
    match run_audit(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Audit failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .siteauditor.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", config::CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Set [access].shared_secret and the scoring service endpoint before auditing.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete audit workflow. Returns the process exit code.
async fn run_audit(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let prober = HttpProber::new(config.probe.timeout_seconds, &config.probe.user_agent)?;
    let analyzer = HttpPageAnalyzer::new(&config.analyzer.endpoint)?;
    let controller = RunController::new(
        Arc::new(prober),
        Arc::new(analyzer),
        AccessGate::new(config.access.shared_secret.clone()),
        config.scheduler_config(),
    );

    // Step 1: Structural checks
    let request = AuditRequest::new(
        args.domain(),
        args.paths.clone(),
        args.credential.clone().unwrap_or_default(),
    );
    let mut run = controller.create_run(request)?;

    spawn_cancel_on_ctrl_c(&run);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let display = spawn_progress_display(events_rx, run.paths().len() as u64, args.quiet);

    // Step 2: Reachability validation
    println!("🔍 Validating {} pages on {}", run.paths().len(), run.domain());
    let validation = controller.validate(&mut run, &events_tx).await?;
    println!("{}", report::format_validation_report(&validation));

    if run.state() == RunState::Cancelled {
        drop(events_tx);
        let _ = display.await;
        eprintln!("⛔ Validation was cancelled; nothing was analyzed.");
        return Ok(1);
    }

    if !validation.all_valid() {
        drop(events_tx);
        let _ = display.await;
        eprintln!(
            "⛔ {} page(s) unreachable. Fix the paths and run again; nothing was analyzed.",
            validation.failing().len()
        );
        return Ok(2);
    }

    if args.validate_only {
        drop(events_tx);
        let _ = display.await;
        println!("✅ Validation complete. No analysis was run.");
        return Ok(0);
    }

    // Step 3: Access gate
    controller.start(&mut run)?;

    // Step 4: Page analysis
    println!("🔬 Analyzing pages (concurrency {})...", config.general.concurrency);
    let aggregate = controller.execute(&mut run, events_tx).await;
    let _ = display.await;
    let aggregate = aggregate?;

    // Step 5: Build and save the report
    let report = AuditReport {
        metadata: ReportMetadata {
            domain: run.domain().to_string(),
            analysis_date: Utc::now(),
            run_state: run.state(),
            pages_requested: run.paths().len(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        aggregate,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = config.general.output.clone();
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path))?;

    print_summary(&run, &report);
    println!("\n✅ Audit {}! Report saved to: {}", run.state(), output_path);

    if report.aggregate.failed_count > 0 {
        warn!("{} page(s) failed", report.aggregate.failed_count);
        return Ok(3);
    }

    Ok(0)
}

fn print_summary(run: &AuditRun, report: &AuditReport) {
    let aggregate = &report.aggregate;

    println!("\n📊 Audit Summary:");
    match aggregate.average_score {
        Some(score) => println!("   Average score: {:.1}", score),
        None => println!("   Average score: n/a (no page completed)"),
    }
    println!(
        "   Completed: {} | Failed: {}",
        aggregate.completed_count, aggregate.failed_count
    );
    for slot in run.snapshot() {
        if let Some(err) = slot.error_text() {
            println!("   ❌ {}: {}", slot.url, err);
        }
    }
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
}

/// Cancel the run when the user presses Ctrl-C.
fn spawn_cancel_on_ctrl_c(run: &AuditRun) {
    let cancel = run.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling audit");
            cancel.cancel();
        }
    });
}

/// Drive a progress bar from the progress event stream until every
/// sender is dropped.
fn spawn_progress_display(
    mut events: UnboundedReceiver<ProgressEvent>,
    pages: u64,
    quiet: bool,
) -> JoinHandle<()> {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(pages);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    };

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Progress: {:?}", event);
            match event.state {
                SlotState::Completed | SlotState::Failed => bar.inc(1),
                SlotState::Analyzing => {
                    let step = event.step.as_deref().unwrap_or("analyzing");
                    let detail = event.step_detail.as_deref().unwrap_or("");
                    bar.set_message(format!("[{}] {}: {} {}", event.slot_index + 1, event.url, step, detail));
                }
                _ => bar.set_message(format!("{} {}", event.url, event.state)),
            }
        }
        bar.finish_and_clear();
    })
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so it returns a description of where the
/// configuration came from instead of logging it.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, config_path.display().to_string()));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, config::CONFIG_FILE.to_string())),
        Ok(None) => Ok((Config::default(), "defaults".to_string())),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}", e);
            Ok((Config::default(), "defaults".to_string()))
        }
    }
}
