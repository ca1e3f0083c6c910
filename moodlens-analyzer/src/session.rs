//! Stream session: one read loop per job
//!
//! Opens the transport, reassembles lines with the [`LineFramer`], classifies
//! them and stops at the first terminal message. The cancellation token is
//! checked on every chunk read and before every dispatched line, so nothing
//! reaches the progress callback once cancellation was requested.

use crate::error::SessionError;
use crate::models::{AnalysisRequest, CanonicalReport, JobId};
use crate::normalizer;
use crate::stream::{classify, LineFramer, StreamMessage};
use crate::transport::Transport;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives progress text in stream order
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

const MAX_LOGGED_LINE_CHARS: usize = 200;

/// Read loop for a single analysis attempt
pub struct StreamSession {
    job_id: JobId,
    request: AnalysisRequest,
    cancellation: CancellationToken,
    on_progress: Option<ProgressCallback>,
}

impl StreamSession {
    pub fn new(job_id: JobId, request: AnalysisRequest, cancellation: CancellationToken) -> Self {
        Self {
            job_id,
            request,
            cancellation,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Run the session to its first terminal message
    ///
    /// A result line is normalized into the returned report. An error line,
    /// a transport failure or a stream that closes without a terminal line
    /// each produce the matching [`SessionError`].
    pub async fn run<T>(&self, transport: &T) -> Result<CanonicalReport, SessionError>
    where
        T: Transport + ?Sized,
    {
        if self.cancellation.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let mut chunks = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(self.cancelled()),
            opened = transport.open(&self.request) => opened.map_err(|e| {
                warn!(job_id = %self.job_id, error = %e, "Failed to open analysis stream");
                SessionError::Connection(e)
            })?,
        };

        let mut framer = LineFramer::new();
        let mut last_progress: Option<String> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(self.cancelled()),
                next = chunks.next() => next,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| {
                warn!(job_id = %self.job_id, error = %e, "Analysis stream broke");
                SessionError::Stream(e)
            })?;

            for line in framer.feed(&chunk) {
                if self.cancellation.is_cancelled() {
                    return Err(self.cancelled());
                }
                if let Some(outcome) = self.dispatch(&line, &mut last_progress) {
                    return outcome;
                }
            }
        }

        if let Some(line) = framer.finish() {
            if let Some(outcome) = self.dispatch(&line, &mut last_progress) {
                return outcome;
            }
        }

        warn!(job_id = %self.job_id, "Stream ended without a terminal message");
        Err(SessionError::StreamEnded)
    }

    /// Handle one line; `Some` ends the session
    fn dispatch(
        &self,
        line: &str,
        last_progress: &mut Option<String>,
    ) -> Option<Result<CanonicalReport, SessionError>> {
        match classify(line) {
            Ok(StreamMessage::Progress(text)) => {
                if last_progress.as_deref() == Some(text.as_str()) {
                    return None;
                }
                debug!(job_id = %self.job_id, progress = %text, "Progress");
                if let Some(callback) = &self.on_progress {
                    callback(&text);
                }
                *last_progress = Some(text);
                None
            }
            Ok(StreamMessage::Result(payload)) => {
                info!(job_id = %self.job_id, "Received analysis result");
                Some(Ok(normalizer::normalize(&payload)))
            }
            Ok(StreamMessage::Error { message, details }) => {
                warn!(job_id = %self.job_id, error = %message, "Service reported an analysis error");
                Some(Err(SessionError::Application { message, details }))
            }
            Err(failure) => {
                let excerpt: String = line.chars().take(MAX_LOGGED_LINE_CHARS).collect();
                warn!(
                    job_id = %self.job_id,
                    reason = %failure,
                    line = %excerpt,
                    "Skipping malformed stream line"
                );
                None
            }
        }
    }

    fn cancelled(&self) -> SessionError {
        debug!(job_id = %self.job_id, "Session cancelled");
        SessionError::Cancelled
    }
}
