//! Error types for keytrack-client
//!
//! Batch-wide errors (`NoBody`, `Transport`) end the upload and overwrite
//! every slot. Frame-level [`ParseError`](crate::sse::ParseError)s and
//! server-reported per-file errors never surface here: the first is
//! skipped, the second is stored on its slot.

use thiserror::Error;

/// Upload error type
#[derive(Debug, Error)]
pub enum UploadError {
    /// Response was established but has no readable body
    #[error("Response has no body")]
    NoBody,

    /// Network failure, non-OK status or stalled read
    #[error("Transport error: {0}")]
    Transport(String),

    /// Cancellation token fired
    #[error("Upload cancelled")]
    Cancelled,

    /// IO error (reading a file to upload)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// keytrack-common error
    #[error("Common error: {0}")]
    Common(#[from] keytrack_common::Error),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;
