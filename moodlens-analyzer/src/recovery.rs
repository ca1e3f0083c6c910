//! Failure classifier and recovery options
//!
//! Turns a terminal session failure into one of four mutually exclusive
//! recovery categories, checked in order:
//!
//! 1. **Retryable-Busy**: text matches "busy" / "processing another"
//! 2. **Partial-Available**: the error line embeds a partial report
//! 3. **RawOnly-Available**: the error line carries only human comments
//! 4. **Hard-Failure**: everything else
//!
//! Cancellation is never classified.

use crate::error::SessionError;
use crate::models::{AnalysisMode, CanonicalReport};
use crate::normalizer;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Fixed delay before the automatic busy retry
pub const BUSY_RETRY_DELAY: Duration = Duration::from_millis(3500);

const BUSY_PATTERNS: [&str; 2] = ["busy", "processing another"];
const PARTIAL_KEYS: [&str; 4] = ["partial", "partial_result", "data", "result"];

/// Automatic retry applied to Retryable-Busy failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyRetryPolicy {
    pub delay: Duration,
    /// Retries per original submission
    pub max_retries: u32,
}

impl Default for BusyRetryPolicy {
    fn default() -> Self {
        Self {
            delay: BUSY_RETRY_DELAY,
            max_retries: 1,
        }
    }
}

/// Recovery category, carrying the degraded report where one exists
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryCategory {
    RetryableBusy,
    PartialAvailable(CanonicalReport),
    RawOnlyAvailable(CanonicalReport),
    HardFailure,
}

impl RecoveryCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RetryableBusy => "retryable_busy",
            Self::PartialAvailable(_) => "partial_available",
            Self::RawOnlyAvailable(_) => "raw_only_available",
            Self::HardFailure => "hard_failure",
        }
    }

    /// Degraded report to render instead of a full one
    pub fn report(&self) -> Option<&CanonicalReport> {
        match self {
            Self::PartialAvailable(report) | Self::RawOnlyAvailable(report) => Some(report),
            Self::RetryableBusy | Self::HardFailure => None,
        }
    }
}

/// Action the consumer may offer after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOption {
    /// Run again with the same provider
    RetrySameProvider(AnalysisMode),
    /// Run again with the other provider
    SwitchProvider(AnalysisMode),
    /// Show the illustrative sample report
    ViewSample,
}

impl Display for RecoveryOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetrySameProvider(mode) => write!(f, "retry with {} provider", mode),
            Self::SwitchProvider(mode) => write!(f, "switch to {} provider", mode),
            Self::ViewSample => f.write_str("view sample report"),
        }
    }
}

/// Classified failure handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub category: RecoveryCategory,
    pub message: String,
    /// Provider the failed attempt used
    pub mode: AnalysisMode,
    /// Never empty
    pub options: Vec<RecoveryOption>,
    /// True when no automatic busy retry follows this failure
    pub retried: bool,
}

impl FailureReport {
    pub fn is_busy(&self) -> bool {
        matches!(self.category, RecoveryCategory::RetryableBusy)
    }

    /// Hard failure for faults outside the stream itself
    pub fn hard(message: impl Into<String>, mode: AnalysisMode) -> Self {
        Self {
            options: options_for(&RecoveryCategory::HardFailure, mode),
            category: RecoveryCategory::HardFailure,
            message: message.into(),
            mode,
            retried: false,
        }
    }

    /// Sample report when viewing one is among the options
    pub fn sample_report(&self) -> Option<CanonicalReport> {
        self.options
            .contains(&RecoveryOption::ViewSample)
            .then(CanonicalReport::sample)
    }
}

impl Display for FailureReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Classify a session failure
///
/// Returns `None` for cancellation, which is final and has no recovery.
/// `retried` records that no automatic busy retry remains for the job.
pub fn classify_failure(
    error: &SessionError,
    mode: AnalysisMode,
    retried: bool,
) -> Option<FailureReport> {
    let category = match error {
        SessionError::Cancelled => return None,
        SessionError::Application { message, details } => classify_application(message, details),
        other => {
            if is_busy(&other.message()) {
                RecoveryCategory::RetryableBusy
            } else {
                RecoveryCategory::HardFailure
            }
        }
    };

    Some(FailureReport {
        options: options_for(&category, mode),
        category,
        message: error.message(),
        mode,
        retried,
    })
}

/// Case-insensitive busy match
pub fn is_busy(message: &str) -> bool {
    let lowered = message.to_lowercase();
    BUSY_PATTERNS.iter().any(|pattern| lowered.contains(pattern))
}

fn classify_application(message: &str, details: &Value) -> RecoveryCategory {
    if is_busy(message) {
        return RecoveryCategory::RetryableBusy;
    }

    let partial = partial_payload(message, details);
    let line_comments = normalizer::raw_comments(details);

    if let Some(partial) = partial.as_ref().filter(|p| normalizer::has_narrative(p)) {
        let mut report = normalizer::normalize(partial);
        if report.raw_comments.is_empty() {
            report.raw_comments = line_comments.unwrap_or_default();
        }
        return RecoveryCategory::PartialAvailable(report);
    }

    let comments = line_comments.or_else(|| partial.as_ref().and_then(|p| normalizer::raw_comments(p)));
    match comments {
        Some(comments) => RecoveryCategory::RawOnlyAvailable(CanonicalReport::from_raw_comments(comments)),
        None => RecoveryCategory::HardFailure,
    }
}

/// Partial report object embedded in an error line
fn partial_payload<'a>(message: &str, details: &'a Value) -> Option<PartialRef<'a>> {
    PARTIAL_KEYS
        .iter()
        .filter_map(|key| details.get(*key))
        .find(|value| value.is_object())
        .map(PartialRef::Borrowed)
        .or_else(|| match serde_json::from_str::<Value>(message) {
            Ok(value @ Value::Object(_)) => Some(PartialRef::Parsed(value)),
            _ => None,
        })
}

/// Partial payload either borrowed from the line or parsed from its message
enum PartialRef<'a> {
    Borrowed(&'a Value),
    Parsed(Value),
}

impl std::ops::Deref for PartialRef<'_> {
    type Target = Value;

    fn deref(&self) -> &Value {
        match self {
            Self::Borrowed(value) => value,
            Self::Parsed(value) => value,
        }
    }
}

fn options_for(category: &RecoveryCategory, mode: AnalysisMode) -> Vec<RecoveryOption> {
    use RecoveryOption::*;

    match category {
        RecoveryCategory::RetryableBusy => vec![RetrySameProvider(mode), SwitchProvider(mode.alternate())],
        RecoveryCategory::PartialAvailable(_) => vec![ViewSample, RetrySameProvider(mode)],
        RecoveryCategory::RawOnlyAvailable(_) | RecoveryCategory::HardFailure => vec![
            RetrySameProvider(mode),
            SwitchProvider(mode.alternate()),
            ViewSample,
        ],
    }
}
