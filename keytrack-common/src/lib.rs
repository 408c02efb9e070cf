//! # Keytrack Common Library
//!
//! Shared code for the keytrack upload client including:
//! - Per-file result model (PerFileResult, SlotStatus)
//! - Observer event types and the broadcast EventBus
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{PerFileResult, SlotStatus, UploadState, GENERIC_FAILURE_MESSAGE};
