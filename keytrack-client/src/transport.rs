//! Upload transport
//!
//! The stream driver talks to the analysis service through
//! [`AnalysisTransport`]. [`HttpTransport`] is the reqwest implementation;
//! tests substitute scripted transports.

use crate::error::{UploadError, UploadResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

const USER_AGENT: &str = concat!("keytrack/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 30;
/// Multipart field name, repeated once per file
pub const UPLOAD_FIELD: &str = "videos";
/// Bytes read from the head of each file for content-type sniffing
const SNIFF_LEN: usize = 8192;
const FALLBACK_MIME: &str = "application/octet-stream";

/// Response body as a stream of raw chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = UploadResult<Bytes>> + Send>>;

/// Where an uploaded file's bytes come from
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// One file of an upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Name sent as the multipart filename; also the batch slot key
    pub filename: String,
    pub source: FileSource,
}

impl UploadFile {
    /// File on disk, named after its last path component
    pub fn from_path(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                keytrack_common::Error::InvalidInput(format!(
                    "Not a file path: {}",
                    path.display()
                ))
            })?;

        Ok(Self {
            filename,
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// In-memory file contents
    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            source: FileSource::Memory(bytes.into()),
        }
    }

    /// Build the multipart part, sniffing the content type from the data
    async fn into_part(self) -> UploadResult<Part> {
        let part = match self.source {
            FileSource::Memory(bytes) => {
                let mime = sniff_mime(&bytes);
                Part::bytes(bytes.to_vec()).mime_str(mime)?
            }
            FileSource::Path(path) => {
                let mut file = tokio::fs::File::open(&path).await?;
                let length = file.metadata().await?.len();

                let mut head = vec![0u8; SNIFF_LEN];
                let read = file.read(&mut head).await?;
                head.truncate(read);
                file.rewind().await?;

                let mime = sniff_mime(&head);
                debug!(path = %path.display(), mime, length, "Prepared upload part");

                let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
                Part::stream_with_length(body, length).mime_str(mime)?
            }
        };

        Ok(part.file_name(self.filename))
    }
}

fn sniff_mime(head: &[u8]) -> &'static str {
    infer::get(head)
        .map(|kind| kind.mime_type())
        .unwrap_or(FALLBACK_MIME)
}

/// Everything needed to open the analysis stream
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when present
    pub token: Option<String>,
    pub files: Vec<UploadFile>,
}

/// Established response
pub struct StreamResponse {
    pub status: u16,
    /// `None` when the response cannot carry a body
    pub body: Option<ByteStream>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Opens the streamed analysis request
///
/// Implementations return `Err(UploadError::Transport)` for network
/// failures and non-OK statuses.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    async fn send(&self, request: UploadRequest) -> UploadResult<StreamResponse>;
}

/// reqwest-backed transport
///
/// Keeps a cookie store so session cookies are sent with uploads.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> UploadResult<Self> {
        // No overall request timeout: the response is a long-lived stream
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .cookie_store(true)
            .build()?;

        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl AnalysisTransport for HttpTransport {
    async fn send(&self, request: UploadRequest) -> UploadResult<StreamResponse> {
        let file_count = request.files.len();
        let mut form = Form::new();
        for file in request.files {
            form = form.part(UPLOAD_FIELD, file.into_part().await?);
        }

        let mut builder = self
            .http_client
            .post(&request.url)
            .header(ACCEPT, "text/event-stream")
            .multipart(form);
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        debug!(
            url = %request.url,
            files = file_count,
            authenticated = request.token.is_some(),
            "Sending analysis upload"
        );

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(UploadError::Transport(format!(
                "HTTP {}: {}",
                status,
                error_text.trim()
            )));
        }

        let body: Option<ByteStream> = if status_has_no_body(status) {
            None
        } else {
            Some(Box::pin(response.bytes_stream().map_err(UploadError::from)))
        };

        Ok(StreamResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Statuses whose responses never carry a body
fn status_has_no_body(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::SWITCHING_PROTOCOLS
            | StatusCode::NO_CONTENT
            | StatusCode::RESET_CONTENT
            | StatusCode::NOT_MODIFIED
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_file_from_path_uses_file_name() {
        let file = UploadFile::from_path("/tmp/clips/holiday.mp4").unwrap();
        assert_eq!(file.filename, "holiday.mp4");
    }

    #[test]
    fn test_upload_file_from_path_rejects_dir_like_path() {
        assert!(UploadFile::from_path("/").is_err());
    }

    #[test]
    fn test_sniff_mime_fallback() {
        assert_eq!(sniff_mime(b"not a known format"), FALLBACK_MIME);
        assert_eq!(sniff_mime(&[]), FALLBACK_MIME);
    }

    #[test]
    fn test_sniff_mime_detects_mp4() {
        // ftyp box with isom brand
        let head = [
            0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', 0x00, 0x00,
            0x02, 0x00,
        ];
        assert_eq!(sniff_mime(&head), "video/mp4");
    }

    #[test]
    fn test_status_has_no_body() {
        assert!(status_has_no_body(StatusCode::NO_CONTENT));
        assert!(!status_has_no_body(StatusCode::OK));
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new().is_ok());
    }
}
