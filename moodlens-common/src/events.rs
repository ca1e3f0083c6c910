//! Job lifecycle events
//!
//! Provides the `AnalysisEvent` enum and the `EventBus` used to observe
//! analysis jobs as they move through the admission queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Analysis job lifecycle event
///
/// Settle events (`JobCompleted`, `JobFailed`, `JobCancelled`) are emitted
/// in the order jobs leave the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnalysisEvent {
    /// Job accepted by the admission queue
    JobQueued {
        job_id: Uuid,
        /// 0 = scheduled immediately, 1 = next to be served, ...
        position: usize,
        timestamp: DateTime<Utc>,
    },

    /// Job became the active job
    JobStarted {
        job_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Progress text forwarded from the stream
    JobProgress {
        job_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job produced a final report
    JobCompleted {
        job_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Job ended with a failure
    JobFailed {
        job_id: Uuid,
        /// Recovery category name (e.g. "hard_failure"); empty when the job faulted
        category: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job was cancelled by its caller
    JobCancelled {
        job_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Busy job will be re-admitted after a delay
    RetryScheduled {
        job_id: Uuid,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl AnalysisEvent {
    /// Job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::JobQueued { job_id, .. }
            | Self::JobStarted { job_id, .. }
            | Self::JobProgress { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id, .. }
            | Self::RetryScheduled { job_id, .. } => *job_id,
        }
    }

    /// Event type name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobQueued { .. } => "JobQueued",
            Self::JobStarted { .. } => "JobStarted",
            Self::JobProgress { .. } => "JobProgress",
            Self::JobCompleted { .. } => "JobCompleted",
            Self::JobFailed { .. } => "JobFailed",
            Self::JobCancelled { .. } => "JobCancelled",
            Self::RetryScheduled { .. } => "RetryScheduled",
        }
    }

    /// True for events that end a job's stay in the queue
    pub fn is_settle(&self) -> bool {
        matches!(
            self,
            Self::JobCompleted { .. } | Self::JobFailed { .. } | Self::JobCancelled { .. }
        )
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use moodlens_common::events::{AnalysisEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(AnalysisEvent::JobStarted {
///     job_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AnalysisEvent,
    ) -> Result<usize, broadcast::error::SendError<AnalysisEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AnalysisEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
