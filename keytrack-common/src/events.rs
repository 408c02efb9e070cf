//! Event types for the keytrack observer channel
//!
//! The stream driver is the only writer of batch state. Everything else
//! (terminal renderer, tests, an embedding UI) observes it through these
//! events, broadcast on an [`EventBus`].

use crate::models::{PerFileResult, UploadState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Keytrack event types
///
/// Events are broadcast via EventBus and can be serialized as JSON for
/// forwarding to another process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KeytrackEvent {
    /// Upload accepted and batch seeded with one pending slot per file
    UploadStarted {
        batch_id: Uuid,
        filenames: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Upload state machine moved to a new state
    StateChanged {
        batch_id: Uuid,
        old_state: UploadState,
        new_state: UploadState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A slot was reconciled against a decoded event
    ///
    /// Emitted once per applied event, never batched.
    SlotUpdated {
        batch_id: Uuid,
        /// Slot index (submission order)
        index: usize,
        slot: PerFileResult,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A frame could not be decoded and was skipped
    FrameRejected {
        batch_id: Uuid,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Stream ended normally
    UploadCompleted {
        batch_id: Uuid,
        /// Navigation target derived from the final batch
        redirect: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transport failure; every slot now carries the generic failure message
    UploadFailed {
        batch_id: Uuid,
        error_message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Upload aborted through its cancellation token
    UploadCancelled {
        batch_id: Uuid,
        /// Slots that were still pending when the upload stopped
        slots_pending: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl KeytrackEvent {
    /// Event type name (matches the serde tag)
    pub fn event_type(&self) -> &str {
        match self {
            KeytrackEvent::UploadStarted { .. } => "UploadStarted",
            KeytrackEvent::StateChanged { .. } => "StateChanged",
            KeytrackEvent::SlotUpdated { .. } => "SlotUpdated",
            KeytrackEvent::FrameRejected { .. } => "FrameRejected",
            KeytrackEvent::UploadCompleted { .. } => "UploadCompleted",
            KeytrackEvent::UploadFailed { .. } => "UploadFailed",
            KeytrackEvent::UploadCancelled { .. } => "UploadCancelled",
        }
    }

    /// Batch the event belongs to
    pub fn batch_id(&self) -> Uuid {
        match self {
            KeytrackEvent::UploadStarted { batch_id, .. }
            | KeytrackEvent::StateChanged { batch_id, .. }
            | KeytrackEvent::SlotUpdated { batch_id, .. }
            | KeytrackEvent::FrameRejected { batch_id, .. }
            | KeytrackEvent::UploadCompleted { batch_id, .. }
            | KeytrackEvent::UploadFailed { batch_id, .. }
            | KeytrackEvent::UploadCancelled { batch_id, .. } => *batch_id,
        }
    }

    /// Whether this event closes the batch
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            KeytrackEvent::UploadCompleted { .. }
                | KeytrackEvent::UploadFailed { .. }
                | KeytrackEvent::UploadCancelled { .. }
        )
    }
}

/// Broadcast channel for keytrack events
///
/// Cloning an EventBus yields another handle to the same channel.
///
/// # Examples
///
/// ```
/// use keytrack_common::events::EventBus;
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KeytrackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<KeytrackEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: KeytrackEvent,
    ) -> Result<usize, broadcast::error::SendError<KeytrackEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: KeytrackEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
