//! Markdown and JSON report generation.
//!
//! This module renders the final audit report for the command line.

use crate::analysis::lowest_scoring;
use crate::models::{
    AggregateResult, AuditReport, PageSlot, ReportMetadata, SlotState, ValidationReport,
    ValidationStatus,
};
use anyhow::Result;
use std::collections::BTreeMap;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &AuditReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Site Audit Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.aggregate));
    output.push_str(&generate_category_section(&report.aggregate.category_averages));
    output.push_str(&generate_pages_section(&report.aggregate.per_slot));
    output.push_str(&generate_attention_section(&report.aggregate.per_slot));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Domain:** {}\n", metadata.domain));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Run State:** {}\n", metadata.run_state));
    section.push_str(&format!(
        "- **Pages Requested:** {}\n",
        metadata.pages_requested
    ));
    section.push_str(&format!(
        "- **Audit Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(aggregate: &AggregateResult) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Average Score | Completed | Failed |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| **{}** | {} | {} |\n\n",
        format_score(aggregate.average_score),
        aggregate.completed_count,
        aggregate.failed_count
    ));

    if aggregate.average_score.is_none() {
        section.push_str("No page completed analysis, so no average score is available.\n\n");
    }

    section
}

/// Generate the per-category rollup.
fn generate_category_section(categories: &BTreeMap<String, f64>) -> String {
    if categories.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("### Scores by Category\n\n");
    section.push_str("| Category | Average |\n");
    section.push_str("|:---|:---:|\n");

    for (category, score) in categories {
        section.push_str(&format!("| {} | {:.1} |\n", category, score));
    }
    section.push('\n');

    section
}

/// Generate the per-page table.
fn generate_pages_section(slots: &[PageSlot]) -> String {
    let mut section = String::new();

    section.push_str("## Pages\n\n");
    section.push_str("| # | URL | State | Score | Load Time | Error |\n");
    section.push_str("|:---:|:---|:---|:---:|:---:|:---|\n");

    for slot in slots {
        section.push_str(&format!(
            "| {} | {} | {} {} | {} | {} | {} |\n",
            slot.index + 1,
            slot.url,
            state_badge(slot.state),
            slot.state,
            format_score(slot.score),
            slot.load_time_ms
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "-".to_string()),
            slot.error_text().unwrap_or_default()
        ));
    }
    section.push('\n');

    section
}

/// Generate the list of weakest pages.
fn generate_attention_section(slots: &[PageSlot]) -> String {
    let weakest = lowest_scoring(slots, 3);
    if weakest.len() < 2 {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Pages Needing Attention\n\n");
    for (i, slot) in weakest.iter().enumerate() {
        section.push_str(&format!(
            "{}. `{}` scored {}\n",
            i + 1,
            slot.path,
            format_score(slot.score)
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by SiteAuditor*\n");

    footer
}

/// Render a validation report as a plain-text table for the terminal.
pub fn format_validation_report(report: &ValidationReport) -> String {
    let mut output = String::new();

    for entry in &report.entries {
        match entry.status {
            ValidationStatus::Valid => {
                output.push_str(&format!("   ✅ {} ({})\n", entry.path, entry.url));
            }
            ValidationStatus::Invalid => {
                output.push_str(&format!(
                    "   ❌ {} ({}): {}\n",
                    entry.path,
                    entry.url,
                    entry.error.as_deref().unwrap_or("unreachable")
                ));
            }
        }
    }

    output
}

fn state_badge(state: SlotState) -> &'static str {
    match state {
        SlotState::Completed => "✅",
        SlotState::Failed | SlotState::ValidationFailed => "❌",
        _ => "⏳",
    }
}

fn format_score(score: Option<f64>) -> String {
    score
        .map(|s| format!("{:.1}", s))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AuditReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
