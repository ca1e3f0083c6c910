//! Analysis job and its lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Job identifier, stable across the automatic busy retry
pub type JobId = Uuid;

/// Which analysis provider the remote service should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Cloud,
    Local,
}

impl AnalysisMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Local => "local",
        }
    }

    /// The provider offered when this one hard-fails
    pub const fn alternate(self) -> Self {
        match self {
            Self::Cloud => Self::Local,
            Self::Local => Self::Cloud,
        }
    }
}

impl Display for AnalysisMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown analysis mode '{other}' (expected 'cloud' or 'local')")),
        }
    }
}

/// Parameters sent to the remote service for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Image to analyze
    #[serde(rename = "image_url")]
    pub subject_url: String,
    pub mode: AnalysisMode,
}

impl AnalysisRequest {
    pub fn new(subject_url: impl Into<String>, mode: AnalysisMode) -> Self {
        Self {
            subject_url: subject_url.into(),
            mode,
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Waiting in the admission queue
    Queued,
    /// Owns the single active slot
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One analysis request as tracked by the admission queue
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub request: AnalysisRequest,
    pub state: JobState,
    /// Valid only while `state == Queued`
    pub queue_position: Option<usize>,
    pub cancellation: CancellationToken,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, request: AnalysisRequest, cancellation: CancellationToken) -> Self {
        Self {
            id,
            request,
            state: JobState::Queued,
            queue_position: None,
            cancellation,
            created_at: Utc::now(),
        }
    }

    pub fn cancellation_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
