//! Data model shared by the queue, session, and normalizer

mod job;
mod report;

pub use job::{AnalysisMode, AnalysisRequest, Job, JobId, JobState};
pub use report::{CanonicalReport, Score, UNKNOWN, UNKNOWN_TRAINABILITY};
