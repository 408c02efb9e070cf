//! Per-file result model shared between the stream driver and its observers

use serde::{Deserialize, Serialize};

/// Message written into every slot when the whole batch fails
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis failed. Please try again.";

/// Explicit slot status
///
/// An empty keyword list alone cannot tell "still processing" apart from
/// "processed, nothing found", so every slot carries its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// No terminal event received yet
    Pending,
    /// Analysis finished (keywords may still be empty)
    Done,
    /// Server reported an error for this file, or the batch failed
    Errored,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Pending => "pending",
            SlotStatus::Done => "done",
            SlotStatus::Errored => "errored",
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file's slot within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerFileResult {
    /// File name as submitted in the upload (unique within a batch)
    pub filename: String,
    /// Keywords reported by the analysis, in server order
    #[serde(default)]
    pub analysis: Vec<String>,
    /// Failure message for this file, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Explicit status tag
    pub status: SlotStatus,
}

impl PerFileResult {
    /// Create a pending slot for a freshly submitted file
    pub fn pending(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            analysis: Vec::new(),
            error: None,
            status: SlotStatus::Pending,
        }
    }

    /// Create a failed slot carrying `message`
    pub fn failed(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            analysis: Vec::new(),
            error: Some(message.into()),
            status: SlotStatus::Errored,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SlotStatus::Pending
    }

    pub fn is_errored(&self) -> bool {
        self.status == SlotStatus::Errored
    }
}

/// Upload lifecycle state
///
/// `Idle -> Sending -> Streaming -> {Completed, Failed, Cancelled}`, with
/// `Sending -> Failed` and `Sending -> Cancelled` as shortcuts. Terminal
/// states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Failed | UploadState::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, Streaming)
                | (Sending, Failed)
                | (Sending, Cancelled)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Idle => "Idle",
            UploadState::Sending => "Sending",
            UploadState::Streaming => "Streaming",
            UploadState::Completed => "Completed",
            UploadState::Failed => "Failed",
            UploadState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
