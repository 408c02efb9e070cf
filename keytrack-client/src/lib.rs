//! keytrack-client library interface
//!
//! Uploads a batch of media files to the analysis service and turns the
//! streamed response into per-file results as they arrive:
//!
//! ```text
//! transport → FrameSplitter → decode_frame → Batch::apply → EventBus
//!                                                  ↓ (stream end)
//!                                           build_redirect → Navigator
//! ```

pub mod batch;
pub mod driver;
pub mod error;
pub mod redirect;
pub mod render;
pub mod sse;
pub mod transport;

pub use crate::batch::{ApplyOutcome, Batch};
pub use crate::driver::{BatchHandle, DriverConfig, StreamDriver, UploadOutcome, UploadSession};
pub use crate::error::{UploadError, UploadResult};
pub use crate::redirect::{build_redirect, build_redirect_value, LogNavigator, Navigator};
pub use crate::transport::{AnalysisTransport, HttpTransport, UploadFile};
