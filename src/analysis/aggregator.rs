//! Score aggregation and statistics.
//!
//! This module computes the domain-level rollup from a snapshot of page
//! slots. Aggregates are derived on demand and never stored.

use crate::models::{AggregateResult, PageSlot, SlotState};
use std::collections::BTreeMap;

/// Aggregate a slot snapshot into a domain-level result.
///
/// Only `Completed` slots contribute scores. Every other terminal state,
/// including validation failures and cancellations, counts as failed.
pub fn aggregate(slots: &[PageSlot]) -> AggregateResult {
    let completed: Vec<&PageSlot> = completed_slots(slots).collect();

    let failed_count = slots
        .iter()
        .filter(|s| matches!(s.state, SlotState::Failed | SlotState::ValidationFailed))
        .count();

    AggregateResult {
        average_score: mean(completed.iter().filter_map(|s| s.score)),
        completed_count: completed.len(),
        failed_count,
        category_averages: category_averages(slots),
        per_slot: slots.to_vec(),
    }
}

/// Mean of each category over the completed slots that report it.
pub fn category_averages(slots: &[PageSlot]) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for slot in completed_slots(slots) {
        for (category, score) in &slot.category_scores {
            let entry = totals.entry(category.clone()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(category, (sum, count))| (category, sum / count as f64))
        .collect()
}

/// The `n` lowest-scoring completed pages, worst first.
pub fn lowest_scoring(slots: &[PageSlot], n: usize) -> Vec<&PageSlot> {
    let mut scored: Vec<&PageSlot> = completed_slots(slots).filter(|s| s.score.is_some()).collect();

    scored.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(n);

    scored
}

fn completed_slots(slots: &[PageSlot]) -> impl Iterator<Item = &PageSlot> {
    slots.iter().filter(|s| s.state == SlotState::Completed)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    fn completed(index: usize, score: f64, categories: &[(&str, f64)]) -> PageSlot {
        let mut slot = PageSlot::new(index, format!("/{}", index), format!("https://e.com/{}", index));
        slot.state = SlotState::Completed;
        slot.score = Some(score);
        slot.load_time_ms = Some(300);
        slot.category_scores = categories.iter().map(|(c, s)| (c.to_string(), *s)).collect();
        slot
    }

    fn failed(index: usize, error: AnalysisError) -> PageSlot {
        let mut slot = PageSlot::new(index, format!("/{}", index), format!("https://e.com/{}", index));
        slot.state = SlotState::Failed;
        slot.analysis_error = Some(error);
        slot
    }

    #[test]
    fn test_average_over_completed_only() {
        let slots = vec![
            completed(0, 80.0, &[]),
            completed(1, 60.0, &[]),
            failed(2, AnalysisError::Timeout(60_000)),
        ];

        let result = aggregate(&slots);

        assert_eq!(result.average_score, Some(70.0));
        assert_eq!(result.completed_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.per_slot, slots);
    }

    #[test]
    fn test_three_page_scenario() {
        let slots = vec![
            completed(0, 90.0, &[]),
            completed(1, 70.0, &[]),
            completed(2, 50.0, &[]),
        ];

        let result = aggregate(&slots);

        assert_eq!(result.average_score, Some(70.0));
        assert_eq!(result.completed_count, 3);
        assert_eq!(result.failed_count, 0);
    }

    #[test]
    fn test_no_completed_slots_has_no_average() {
        let mut unreachable = PageSlot::new(1, "/gone".to_string(), "https://e.com/gone".to_string());
        unreachable.state = SlotState::ValidationFailed;
        unreachable.validation_error = Some("HTTP 404".to_string());

        let slots = vec![failed(0, AnalysisError::Cancelled), unreachable];
        let result = aggregate(&slots);

        assert_eq!(result.average_score, None);
        assert_eq!(result.completed_count, 0);
        assert_eq!(result.failed_count, 2);
    }

    #[test]
    fn test_partial_snapshot_counts_only_terminal_slots() {
        let mut analyzing = PageSlot::new(1, "/b".to_string(), "https://e.com/b".to_string());
        analyzing.state = SlotState::Analyzing;

        let result = aggregate(&[completed(0, 40.0, &[]), analyzing]);

        assert_eq!(result.average_score, Some(40.0));
        assert_eq!(result.completed_count, 1);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.per_slot.len(), 2);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let slots = vec![
            completed(0, 33.0, &[("seo", 10.0)]),
            failed(1, AnalysisError::Upstream("502".to_string())),
        ];

        assert_eq!(aggregate(&slots), aggregate(&slots));
    }

    #[test]
    fn test_category_averages() {
        let slots = vec![
            completed(0, 80.0, &[("seo", 90.0), ("ai_visibility", 70.0)]),
            completed(1, 60.0, &[("seo", 50.0)]),
            failed(2, AnalysisError::Cancelled),
        ];

        let averages = category_averages(&slots);

        assert_eq!(averages.get("seo"), Some(&70.0));
        assert_eq!(averages.get("ai_visibility"), Some(&70.0));
        assert_eq!(averages.len(), 2);
    }

    #[test]
    fn test_lowest_scoring() {
        let slots = vec![
            completed(0, 80.0, &[]),
            completed(1, 20.0, &[]),
            failed(2, AnalysisError::Cancelled),
            completed(3, 55.0, &[]),
        ];

        let worst = lowest_scoring(&slots, 2);

        assert_eq!(worst.len(), 2);
        assert_eq!(worst[0].index, 1);
        assert_eq!(worst[1].index, 3);
    }
}
