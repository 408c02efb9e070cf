//! Common error types for keytrack

use thiserror::Error;

/// Common result type for keytrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the keytrack crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (e.g. duplicate filenames in one batch)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error (broken state machine invariant)
    #[error("Internal error: {0}")]
    Internal(String),
}
