//! Stream driver
//!
//! Owns one upload from request to terminal state:
//!
//! ```text
//! Idle → Sending → Streaming → Completed
//!           │          ├──────→ Failed
//!           ├──────────┴──────→ Cancelled
//!           └─────────────────→ Failed
//! ```
//!
//! The loop is sequential: one chunk read in flight at a time, and each
//! chunk's frames are decoded and reconciled before the next read. The only
//! suspension points are awaiting the response and awaiting the next chunk;
//! both observe the cancellation token.

use crate::batch::{ApplyOutcome, Batch};
use crate::error::{UploadError, UploadResult};
use crate::redirect::{build_redirect, Navigator};
use crate::sse::{decode_frame, FrameSplitter};
use crate::transport::{AnalysisTransport, ByteStream, UploadFile, UploadRequest};
use bytes::Bytes;
use futures::StreamExt;
use keytrack_common::config::ClientConfig;
use keytrack_common::events::{EventBus, KeytrackEvent};
use keytrack_common::{Error, UploadState, GENERIC_FAILURE_MESSAGE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared read handle to a batch; only the driver writes through it
pub type BatchHandle = Arc<RwLock<Batch>>;

/// Per-upload settings
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Full analysis endpoint URL
    pub analyse_url: String,
    /// Bearer token; `None` sends the request unauthenticated
    pub token: Option<String>,
    /// Maximum wait for a single chunk; `None` waits indefinitely
    pub chunk_timeout: Option<Duration>,
}

impl From<&ClientConfig> for DriverConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            analyse_url: config.analyse_url(),
            token: config.token.clone(),
            chunk_timeout: config.chunk_timeout,
        }
    }
}

/// Final result of one upload
#[derive(Debug)]
pub struct UploadOutcome {
    /// Terminal state (Completed, Failed or Cancelled)
    pub state: UploadState,
    /// Final, sealed batch
    pub batch: Batch,
    /// Navigation target; set only for Completed
    pub redirect: Option<String>,
    /// Failure cause; set for Failed and Cancelled
    pub failure: Option<UploadError>,
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == UploadState::Completed
    }
}

/// Starts uploads
///
/// Cheap to share; every upload gets its own [`UploadSession`].
#[derive(Clone)]
pub struct StreamDriver {
    transport: Arc<dyn AnalysisTransport>,
    config: DriverConfig,
    event_bus: EventBus,
    navigator: Option<Arc<dyn Navigator>>,
}

impl StreamDriver {
    pub fn new(
        transport: Arc<dyn AnalysisTransport>,
        config: DriverConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            transport,
            config,
            event_bus,
            navigator: None,
        }
    }

    /// Navigator invoked with the redirect target on completion
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Seed a batch for `files` and return the session that will run it
    ///
    /// Returns `Ok(None)` for an empty file set (nothing is sent).
    pub fn start(&self, files: Vec<UploadFile>) -> UploadResult<Option<UploadSession>> {
        if files.is_empty() {
            debug!("Upload requested with no files, ignoring");
            return Ok(None);
        }

        let batch = Batch::initialize(files.iter().map(|f| f.filename.clone()))?;

        Ok(Some(UploadSession {
            batch_id: batch.batch_id(),
            batch: Arc::new(RwLock::new(batch)),
            state: UploadState::Idle,
            files,
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            event_bus: self.event_bus.clone(),
            navigator: self.navigator.clone(),
        }))
    }

    /// Start and run an upload to its terminal state
    pub async fn upload(
        &self,
        files: Vec<UploadFile>,
        cancel: CancellationToken,
    ) -> UploadResult<Option<UploadOutcome>> {
        match self.start(files)? {
            Some(session) => session.run(cancel).await.map(Some),
            None => Ok(None),
        }
    }
}

/// One upload's state machine
pub struct UploadSession {
    batch_id: Uuid,
    batch: BatchHandle,
    state: UploadState,
    files: Vec<UploadFile>,
    transport: Arc<dyn AnalysisTransport>,
    config: DriverConfig,
    event_bus: EventBus,
    navigator: Option<Arc<dyn Navigator>>,
}

impl UploadSession {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Read handle for observers
    pub fn batch_handle(&self) -> BatchHandle {
        Arc::clone(&self.batch)
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Drive the upload to a terminal state
    ///
    /// Batch-wide failures and cancellation are reported in the returned
    /// [`UploadOutcome`], not as `Err`. `Err` means a broken invariant.
    pub async fn run(mut self, cancel: CancellationToken) -> UploadResult<UploadOutcome> {
        let filenames = self
            .files
            .iter()
            .map(|f| f.filename.clone())
            .collect::<Vec<_>>();
        info!(
            batch_id = %self.batch_id,
            files = filenames.len(),
            "Starting analysis upload"
        );
        self.event_bus.emit_lossy(KeytrackEvent::UploadStarted {
            batch_id: self.batch_id,
            filenames,
            timestamp: chrono::Utc::now(),
        });

        self.transition(UploadState::Sending)?;

        let request = UploadRequest {
            url: self.config.analyse_url.clone(),
            token: self.config.token.clone(),
            files: std::mem::take(&mut self.files),
        };
        let transport = Arc::clone(&self.transport);

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = transport.send(request) => Some(result),
        };

        let response = match sent {
            None => return self.finish_cancelled().await,
            Some(Err(e)) => return self.finish_failed(e).await,
            Some(Ok(response)) => response,
        };

        let Some(mut body) = response.body else {
            warn!(
                batch_id = %self.batch_id,
                status = response.status,
                "Analysis response has no body"
            );
            return self.finish_failed(UploadError::NoBody).await;
        };

        self.transition(UploadState::Streaming)?;

        let mut splitter = FrameSplitter::new();
        let chunk_timeout = self.config.chunk_timeout;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = next_chunk(&mut body, chunk_timeout) => Some(next),
            };

            match next {
                None => {
                    // Dropping the body aborts the underlying request
                    drop(body);
                    return self.finish_cancelled().await;
                }
                Some(Ok(Some(chunk))) => {
                    for frame in splitter.push(&chunk) {
                        self.handle_frame(&frame).await;
                    }
                }
                Some(Ok(None)) => break,
                Some(Err(e)) => return self.finish_failed(e).await,
            }
        }

        if let Some(fragment) = splitter.finish() {
            debug!(
                batch_id = %self.batch_id,
                fragment = %fragment,
                "Stream ended inside a frame"
            );
        }

        self.finish_completed().await
    }

    /// Decode one frame and reconcile it; failures stay local to the frame
    async fn handle_frame(&self, frame: &str) {
        let event = match decode_frame(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(batch_id = %self.batch_id, error = %e, "Skipping malformed frame");
                self.event_bus.emit_lossy(KeytrackEvent::FrameRejected {
                    batch_id: self.batch_id,
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                return;
            }
        };

        if let Some(error) = &event.error {
            warn!(
                batch_id = %self.batch_id,
                filename = %event.filename,
                error = %error,
                "Server reported an analysis error for file"
            );
        }

        let mut batch = self.batch.write().await;
        if let ApplyOutcome::Updated { index } = batch.apply(event) {
            if let Some(slot) = batch.slot(index) {
                self.event_bus.emit_lossy(KeytrackEvent::SlotUpdated {
                    batch_id: self.batch_id,
                    index,
                    slot: slot.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }

    async fn finish_completed(mut self) -> UploadResult<UploadOutcome> {
        self.transition(UploadState::Completed)?;

        let batch = {
            let mut batch = self.batch.write().await;
            batch.seal();
            batch.clone()
        };

        let redirect = build_redirect(batch.slots());
        info!(
            batch_id = %self.batch_id,
            files = batch.len(),
            still_pending = batch.pending_count(),
            "Analysis stream completed"
        );

        self.event_bus.emit_lossy(KeytrackEvent::UploadCompleted {
            batch_id: self.batch_id,
            redirect: redirect.clone(),
            timestamp: chrono::Utc::now(),
        });

        if let (Some(navigator), Some(target)) = (&self.navigator, &redirect) {
            navigator.navigate(target);
        }

        Ok(UploadOutcome {
            state: self.state,
            batch,
            redirect,
            failure: None,
        })
    }

    /// Batch-wide failure: every slot gets the generic message
    async fn finish_failed(mut self, error: UploadError) -> UploadResult<UploadOutcome> {
        self.transition(UploadState::Failed)?;
        warn!(batch_id = %self.batch_id, error = %error, "Analysis upload failed");

        let batch = {
            let mut batch = self.batch.write().await;
            batch.fail_all(GENERIC_FAILURE_MESSAGE);
            batch.seal();
            batch.clone()
        };

        for (index, slot) in batch.slots().iter().enumerate() {
            self.event_bus.emit_lossy(KeytrackEvent::SlotUpdated {
                batch_id: self.batch_id,
                index,
                slot: slot.clone(),
                timestamp: chrono::Utc::now(),
            });
        }
        self.event_bus.emit_lossy(KeytrackEvent::UploadFailed {
            batch_id: self.batch_id,
            error_message: error.to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(UploadOutcome {
            state: self.state,
            batch,
            redirect: None,
            failure: Some(error),
        })
    }

    async fn finish_cancelled(mut self) -> UploadResult<UploadOutcome> {
        self.transition(UploadState::Cancelled)?;

        let batch = {
            let mut batch = self.batch.write().await;
            batch.seal();
            batch.clone()
        };

        let slots_pending = batch.pending_count();
        info!(batch_id = %self.batch_id, slots_pending, "Analysis upload cancelled");
        self.event_bus.emit_lossy(KeytrackEvent::UploadCancelled {
            batch_id: self.batch_id,
            slots_pending,
            timestamp: chrono::Utc::now(),
        });

        Ok(UploadOutcome {
            state: self.state,
            batch,
            redirect: None,
            failure: Some(UploadError::Cancelled),
        })
    }

    fn transition(&mut self, next: UploadState) -> UploadResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "Invalid upload state transition {} -> {}",
                self.state, next
            ))
            .into());
        }

        debug!(batch_id = %self.batch_id, from = %self.state, to = %next, "Upload state change");
        let old_state = std::mem::replace(&mut self.state, next);
        self.event_bus.emit_lossy(KeytrackEvent::StateChanged {
            batch_id: self.batch_id,
            old_state,
            new_state: next,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }
}

/// Await the next chunk, honoring the optional per-chunk timeout
async fn next_chunk(
    body: &mut ByteStream,
    timeout: Option<Duration>,
) -> UploadResult<Option<Bytes>> {
    let next = match timeout {
        Some(limit) => tokio::time::timeout(limit, body.next())
            .await
            .map_err(|_| {
                UploadError::Transport(format!("No data received for {}s", limit.as_secs_f64()))
            })?,
        None => body.next().await,
    };
    next.transpose()
}
