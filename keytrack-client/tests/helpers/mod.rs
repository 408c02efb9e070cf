//! Test Helper Utilities
//!
//! Scripted transports and event collection for keytrack-client tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use keytrack_client::transport::{AnalysisTransport, ByteStream, StreamResponse, UploadRequest};
use keytrack_client::{DriverConfig, StreamDriver, UploadError, UploadFile, UploadResult};
use keytrack_common::events::{EventBus, KeytrackEvent};
use keytrack_common::UploadState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// One step of a scripted response body
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver these bytes as one chunk
    Chunk(Vec<u8>),
    /// Fail the read with a transport error
    Fail(String),
    /// Never deliver anything again (stalled connection)
    Stall,
    /// Wait before the next step
    Delay(Duration),
}

pub fn chunk(text: &str) -> Step {
    Step::Chunk(text.as_bytes().to_vec())
}

/// How the scripted transport answers the request
#[derive(Debug, Clone)]
pub enum Script {
    /// Response with a body following `steps`
    Body(Vec<Step>),
    /// Response established but without a body
    NoBody,
    /// Request fails before a response (network error, non-OK status)
    SendError(String),
}

/// Transport replaying a script and recording the requests it saw
pub struct ScriptedTransport {
    script: Script,
    pub requests: Mutex<Vec<(String, Option<String>, Vec<String>)>>,
}

impl ScriptedTransport {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AnalysisTransport for ScriptedTransport {
    async fn send(&self, request: UploadRequest) -> UploadResult<StreamResponse> {
        self.requests.lock().unwrap().push((
            request.url.clone(),
            request.token.clone(),
            request.files.iter().map(|f| f.filename.clone()).collect(),
        ));

        match &self.script {
            Script::SendError(message) => Err(UploadError::Transport(message.clone())),
            Script::NoBody => Ok(StreamResponse {
                status: 204,
                body: None,
            }),
            Script::Body(steps) => Ok(StreamResponse {
                status: 200,
                body: Some(scripted_body(steps.clone())),
            }),
        }
    }
}

fn scripted_body(steps: Vec<Step>) -> ByteStream {
    Box::pin(async_stream::stream! {
        for step in steps {
            match step {
                Step::Chunk(bytes) => yield Ok(Bytes::from(bytes)),
                Step::Fail(message) => {
                    yield Err(UploadError::Transport(message));
                    return;
                }
                Step::Stall => futures::future::pending::<()>().await,
                Step::Delay(duration) => tokio::time::sleep(duration).await,
            }
        }
    })
}

pub fn test_config() -> DriverConfig {
    DriverConfig {
        analyse_url: "http://analysis.test/api/v1/analyse".to_string(),
        token: None,
        chunk_timeout: None,
    }
}

pub fn driver_for(transport: Arc<ScriptedTransport>, bus: &EventBus) -> StreamDriver {
    StreamDriver::new(transport, test_config(), bus.clone())
}

pub fn files(names: &[&str]) -> Vec<UploadFile> {
    names
        .iter()
        .map(|name| UploadFile::from_bytes(*name, &b"\x00\x00\x00\x18ftypisom"[..]))
        .collect()
}

/// Drain every event currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<KeytrackEvent>) -> Vec<KeytrackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The `new_state` of every StateChanged event, in order
pub fn state_path(events: &[KeytrackEvent]) -> Vec<UploadState> {
    events
        .iter()
        .filter_map(|event| match event {
            KeytrackEvent::StateChanged { new_state, .. } => Some(*new_state),
            _ => None,
        })
        .collect()
}
