//! Event decoding for data frames
//!
//! Payload shape:
//!
//! ```text
//! data: {"filename":"a.mp4","analysis":["jazz","piano"]}
//! data: {"filename":"b.mp4","analysis":"[\"funk\"]"}
//! data: {"filename":"c.mp4","error":"Unsupported codec"}
//! ```
//!
//! `analysis` arrives either as a JSON array or as a string holding a
//! JSON-encoded array. Both are accepted here and coerced once, so the
//! reconciler only ever sees a plain keyword list.

use serde::Deserialize;
use thiserror::Error;

/// Prefix of the payload line in a data frame
pub const DATA_PREFIX: &str = "data: ";

/// Frame decoding errors
///
/// Always frame-local: the driver skips the frame and keeps reading.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Frame has no 'data: ' prefix")]
    MissingPrefix,

    #[error("Invalid event JSON: {0}")]
    InvalidEvent(#[source] serde_json::Error),

    #[error("Invalid string-encoded analysis for {filename}: {source}")]
    InvalidEncodedAnalysis {
        filename: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The `analysis` field as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AnalysisPayload {
    /// Native JSON array
    Keywords(Vec<String>),
    /// JSON array encoded inside a string
    Encoded(String),
}

impl AnalysisPayload {
    /// Coerce into a keyword list, parsing the encoded form if needed
    pub fn into_keywords(self) -> Result<Vec<String>, serde_json::Error> {
        match self {
            AnalysisPayload::Keywords(keywords) => Ok(keywords),
            AnalysisPayload::Encoded(raw) => serde_json::from_str(&raw),
        }
    }
}

/// Wire form of one event
#[derive(Debug, Deserialize)]
struct WireEvent {
    filename: String,
    #[serde(default)]
    analysis: Option<AnalysisPayload>,
    #[serde(default)]
    error: Option<String>,
}

/// One decoded per-file result, analysis already coerced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub filename: String,
    pub analysis: Vec<String>,
    pub error: Option<String>,
}

impl DecodedEvent {
    pub fn new(filename: impl Into<String>, analysis: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            analysis,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Return the payload of a data frame, or `None` if the frame has no prefix
pub fn data_payload(frame: &str) -> Option<&str> {
    frame.trim_start().strip_prefix(DATA_PREFIX)
}

/// Decode one complete frame into a [`DecodedEvent`]
pub fn decode_frame(frame: &str) -> Result<DecodedEvent, ParseError> {
    let payload = data_payload(frame).ok_or(ParseError::MissingPrefix)?;
    let wire: WireEvent = serde_json::from_str(payload).map_err(ParseError::InvalidEvent)?;

    let analysis = match wire.analysis {
        Some(payload) => {
            payload
                .into_keywords()
                .map_err(|source| ParseError::InvalidEncodedAnalysis {
                    filename: wire.filename.clone(),
                    source,
                })?
        }
        None => Vec::new(),
    };

    Ok(DecodedEvent {
        filename: wire.filename,
        analysis,
        error: wire.error,
    })
}
