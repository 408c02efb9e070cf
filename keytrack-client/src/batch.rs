//! Batch state and reconciliation
//!
//! A [`Batch`] holds one slot per submitted file, in submission order. The
//! order is fixed when the batch is created; events are matched to slots by
//! filename only, so files may finish server-side in any order.

use crate::sse::DecodedEvent;
use keytrack_common::{Error, PerFileResult, Result, SlotStatus};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of applying one decoded event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Slot at `index` now holds the event's content
    Updated { index: usize },
    /// No slot carries the event's filename; batch unchanged
    Unmatched,
    /// Batch already finished; batch unchanged
    Sealed,
}

/// Ordered per-file result slots for one upload
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    batch_id: Uuid,
    slots: Vec<PerFileResult>,
    sealed: bool,
}

impl Batch {
    /// Create one pending slot per filename, preserving input order
    ///
    /// Filenames must be unique within a batch.
    pub fn initialize<I, S>(filenames: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut slots = Vec::new();

        for filename in filenames {
            let filename = filename.into();
            if !seen.insert(filename.clone()) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate filename in batch: {}",
                    filename
                )));
            }
            slots.push(PerFileResult::pending(filename));
        }

        Ok(Self {
            batch_id: Uuid::new_v4(),
            slots,
            sealed: false,
        })
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn slots(&self) -> &[PerFileResult] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&PerFileResult> {
        self.slots.get(index)
    }

    pub fn find(&self, filename: &str) -> Option<&PerFileResult> {
        self.slots.iter().find(|slot| slot.filename == filename)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_pending()).count()
    }

    /// Apply a decoded event to the slot with the same filename
    ///
    /// Last write wins: the slot's analysis and error are replaced, never
    /// merged. Unknown filenames leave the batch untouched.
    pub fn apply(&mut self, event: DecodedEvent) -> ApplyOutcome {
        if self.sealed {
            warn!(
                batch_id = %self.batch_id,
                filename = %event.filename,
                "Ignoring event for sealed batch"
            );
            return ApplyOutcome::Sealed;
        }

        let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.filename == event.filename)
        else {
            warn!(
                batch_id = %self.batch_id,
                filename = %event.filename,
                "Event for a file not in this batch, ignoring"
            );
            return ApplyOutcome::Unmatched;
        };

        let slot = &mut self.slots[index];
        slot.status = if event.error.is_some() {
            SlotStatus::Errored
        } else {
            SlotStatus::Done
        };
        slot.analysis = event.analysis;
        slot.error = event.error;

        debug!(
            batch_id = %self.batch_id,
            filename = %slot.filename,
            status = %slot.status,
            keywords = slot.analysis.len(),
            "Slot reconciled"
        );

        ApplyOutcome::Updated { index }
    }

    /// Overwrite every slot with `message`
    ///
    /// Used on batch-wide transport failure. Slots that already completed
    /// are overwritten as well.
    pub fn fail_all(&mut self, message: &str) {
        if self.sealed {
            return;
        }
        for slot in &mut self.slots {
            *slot = PerFileResult::failed(slot.filename.clone(), message);
        }
    }

    /// Freeze the batch; later `apply`/`fail_all` calls are no-ops
    pub fn seal(&mut self) {
        self.sealed = true;
    }
}
