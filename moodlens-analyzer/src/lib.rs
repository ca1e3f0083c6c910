//! moodlens-analyzer library interface
//!
//! Single-flight job queue and streaming-result pipeline for image
//! analysis. Jobs are admitted to a process-wide FIFO, run one at a time
//! against a service that streams NDJSON, and end in either a normalized
//! [`CanonicalReport`] or a classified failure with recovery options.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod queue;
pub mod recovery;
pub mod session;
pub mod stream;
pub mod transport;

pub use crate::client::{AnalysisClient, ClientSettings, JobHandle, SubmitOptions, Submission};
pub use crate::error::{AnalysisFailure, QueueError, SessionError, TransportError};
pub use crate::models::{AnalysisMode, CanonicalReport, Score};
pub use crate::queue::AdmissionQueue;
pub use crate::recovery::{FailureReport, RecoveryCategory, RecoveryOption};
