//! Transports delivering the analysis service's chunked response body
//!
//! The [`Transport`] trait is the seam between the stream session and the
//! network. [`HttpTransport`] talks to the real service with reqwest;
//! [`ReplayTransport`] plays back a recorded NDJSON body from disk.

use crate::models::AnalysisRequest;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const USER_AGENT: &str = concat!("moodlens-analyzer/", env!("CARGO_PKG_VERSION"));
const MAX_STATUS_MESSAGE_CHARS: usize = 500;
const REPLAY_CHUNK_BYTES: usize = 256;

/// Raw body chunks in arrival order
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Transport-level failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not reach the service
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Service answered with a non-success status before any body was read
    #[error("Service responded with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Body stream broke after it started
    #[error("Stream read failed: {0}")]
    Read(String),
}

impl TransportError {
    /// Failures that happened before any body bytes were read
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Status { .. })
    }

    /// Server- or client-provided failure text
    pub fn message(&self) -> &str {
        match self {
            Self::Connect(message) | Self::Read(message) => message,
            Self::Status { message, .. } => message,
        }
    }
}

/// Opens the response body for one analysis request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &AnalysisRequest) -> Result<ChunkStream, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn open(&self, request: &AnalysisRequest) -> Result<ChunkStream, TransportError> {
        (**self).open(request).await
    }
}

/// HTTP transport posting the job to the analysis endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Only a connect timeout is applied; a slow but live stream may run indefinitely
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &AnalysisRequest) -> Result<ChunkStream, TransportError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            subject_url = %request.subject_url,
            mode = %request.mode,
            "Submitting analysis request"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: status_message(&body, status.canonical_reason()),
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::Read(e.to_string()))
            });
        Ok(Box::pin(stream))
    }
}

/// Extract a readable message from a failed response body
fn status_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "detail"] {
            match object.get(key) {
                Some(Value::String(text)) if !text.trim().is_empty() => return text.trim().to_string(),
                Some(Value::Object(inner)) => {
                    if let Some(text) = inner.get("message").and_then(Value::as_str) {
                        return text.to_string();
                    }
                }
                _ => {}
            }
        }
    }

    let text = body.trim();
    if text.is_empty() {
        return reason.unwrap_or("request failed").to_string();
    }
    text.chars().take(MAX_STATUS_MESSAGE_CHARS).collect()
}

/// Plays back a recorded NDJSON response body in small chunks
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    path: PathBuf,
}

impl ReplayTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn open(&self, request: &AnalysisRequest) -> Result<ChunkStream, TransportError> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", self.path.display(), e)))?;

        tracing::debug!(
            recording = %self.path.display(),
            subject_url = %request.subject_url,
            "Replaying recorded analysis stream"
        );

        let stream = async_stream::stream! {
            let mut buf = vec![0u8; REPLAY_CHUNK_BYTES];
            loop {
                match file.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => yield Ok(buf[..n].to_vec()),
                    Err(e) => {
                        yield Err(TransportError::Read(e.to_string()));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
