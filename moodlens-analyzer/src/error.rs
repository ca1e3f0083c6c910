//! Error types for the analysis pipeline
//!
//! Each layer reports its own failure type:
//! - [`TransportError`] from opening or reading the response body
//! - [`SessionError`] from one stream session
//! - [`QueueError`] from admission
//! - [`AnalysisFailure`] as seen by the consumer, after recovery classification

use crate::models::JobId;
use crate::recovery::FailureReport;
use serde_json::Value;
use thiserror::Error;

pub use crate::transport::TransportError;

/// Message for a stream that closed without a result or error line
pub const STREAM_ENDED_MESSAGE: &str = "Stream ended without final result.";

/// Why a stream session did not produce a report
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Caller requested cancellation; final and never retried
    #[error("Analysis cancelled")]
    Cancelled,

    /// Service unreachable or answered with a failure status before the body
    #[error(transparent)]
    Connection(TransportError),

    /// An `error` line arrived mid-stream
    #[error("{message}")]
    Application {
        message: String,
        /// Whole error line, which may embed partial data
        details: Value,
    },

    /// Body closed without any terminal line
    #[error("Stream ended without final result.")]
    StreamEnded,

    /// Body broke after reading started
    #[error(transparent)]
    Stream(TransportError),
}

impl SessionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Failure text used for busy detection and display
    pub fn message(&self) -> String {
        match self {
            Self::Connection(e) | Self::Stream(e) => e.message().to_string(),
            Self::Application { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Admission errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A job with this id is already active or waiting
    #[error("Job {0} is already queued or running")]
    DuplicateJob(JobId),
}

/// Final failure delivered to the consumer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisFailure {
    /// Cancelled by the caller; no recovery is offered
    #[error("Analysis cancelled")]
    Cancelled,

    /// Classified failure with its recovery options
    #[error("{0}")]
    Failed(FailureReport),
}

impl AnalysisFailure {
    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::Failed(report) => Some(report),
            Self::Cancelled => None,
        }
    }
}
