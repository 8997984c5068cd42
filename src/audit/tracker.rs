//! Page state tracker.
//!
//! An arena of page slots indexed by request position. Each mutation is a
//! single update to one slot under a short write lock that is never held
//! across an await point, so readers only ever see whole slots.

use crate::error::{AnalysisError, AuditError, Result};
use crate::models::{PageAnalysis, PageSlot, SlotState};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};

#[derive(Debug)]
pub struct PageStateTracker {
    slots: RwLock<Vec<PageSlot>>,
}

impl PageStateTracker {
    /// Creates a tracker holding `slots` in order.
    pub fn new(slots: Vec<PageSlot>) -> Self {
        Self {
            slots: RwLock::new(slots),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Full-run snapshot, in slot order.
    pub fn snapshot(&self) -> Vec<PageSlot> {
        self.read().clone()
    }

    /// Snapshot of a single slot.
    pub fn slot(&self, index: usize) -> Result<PageSlot> {
        self.read()
            .get(index)
            .cloned()
            .ok_or(AuditError::UnknownSlot(index))
    }

    pub fn mark_validating(&self, index: usize) -> Result<PageSlot> {
        self.transition(index, SlotState::Validating, |_| {})
    }

    /// Record the probe result for a slot.
    pub fn mark_validated(&self, index: usize, ok: bool, error: Option<String>) -> Result<PageSlot> {
        if ok {
            self.transition(index, SlotState::Validated, |_| {})
        } else {
            self.transition(index, SlotState::ValidationFailed, |slot| {
                slot.validation_error = Some(error.unwrap_or_else(|| "Unreachable".to_string()));
            })
        }
    }

    /// Move a validated slot to `Analyzing`, or fail it as cancelled when
    /// `cancelled` reports true. Both the check and the transition happen
    /// under the same write lock.
    pub fn begin_analysis<F>(&self, index: usize, cancelled: F) -> Result<PageSlot>
    where
        F: FnOnce() -> bool,
    {
        let mut slots = self.write();
        if cancelled() {
            Self::apply(&mut slots, index, SlotState::Failed, |slot| {
                slot.analysis_error = Some(AnalysisError::Cancelled);
            })
        } else {
            Self::apply(&mut slots, index, SlotState::Analyzing, |_| {})
        }
    }

    pub fn mark_completed(&self, index: usize, analysis: PageAnalysis) -> Result<PageSlot> {
        self.transition(index, SlotState::Completed, |slot| {
            slot.score = Some(analysis.score);
            slot.load_time_ms = Some(analysis.load_time_ms);
            slot.category_scores = analysis.category_scores;
        })
    }

    pub fn mark_failed(&self, index: usize, error: AnalysisError) -> Result<PageSlot> {
        self.transition(index, SlotState::Failed, |slot| {
            slot.analysis_error = Some(error);
        })
    }

    fn transition<F>(&self, index: usize, to: SlotState, update: F) -> Result<PageSlot>
    where
        F: FnOnce(&mut PageSlot),
    {
        Self::apply(&mut self.write(), index, to, update)
    }

    fn apply<F>(slots: &mut [PageSlot], index: usize, to: SlotState, update: F) -> Result<PageSlot>
    where
        F: FnOnce(&mut PageSlot),
    {
        let slot = slots.get_mut(index).ok_or(AuditError::UnknownSlot(index))?;

        if !slot.state.can_transition_to(to) {
            error!(
                "Illegal slot transition for {} ({}): {} -> {}",
                index, slot.url, slot.state, to
            );
            return Err(AuditError::InvariantViolation {
                slot: index,
                from: slot.state,
                to,
            });
        }

        debug!("Slot {} ({}): {} -> {}", index, slot.url, slot.state, to);
        update(slot);
        slot.state = to;
        Ok(slot.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<PageSlot>> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<PageSlot>> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
