//! Admission queue
//!
//! Process-wide FIFO of analysis jobs with at most one job active at any
//! instant. Jobs are started strictly in enqueue order; when the active job
//! settles the next waiting job is scheduled immediately.
//!
//! Queue positions:
//! - 0 = active (or scheduled immediately on enqueue)
//! - 1 = next to be served
//! - 2.. = further back
//!
//! Each job's task runs in its own spawned tokio task. A panic inside the
//! task surfaces as a `JoinError`, is logged, and settles the job as Failed
//! so the queue keeps moving.

use crate::error::QueueError;
use crate::models::{Job, JobId, JobState};
use chrono::Utc;
use moodlens_common::events::{AnalysisEvent, EventBus};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

type JobTask = Pin<Box<dyn Future<Output = Settlement> + Send>>;

static GLOBAL_QUEUE: Lazy<AdmissionQueue> = Lazy::new(|| AdmissionQueue::new(EventBus::default()));

/// How a job's task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    Failed {
        /// Recovery category name, empty when the task faulted
        category: String,
        message: String,
    },
    Cancelled,
}

impl Settlement {
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed => JobState::Completed,
            Self::Failed { .. } => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Job was waiting and has been removed
    Dequeued,
    /// Job is active; its token was cancelled and it will settle shortly
    Signalled,
    /// Job is not known to the queue (never queued, or already settled)
    NotFound,
}

struct PendingJob {
    job: Job,
    task: JobTask,
}

#[derive(Default)]
struct QueueState {
    /// Busy flag: no job starts while this is set
    active: Option<Job>,
    pending: VecDeque<PendingJob>,
}

impl QueueState {
    fn contains(&self, id: JobId) -> bool {
        self.active.as_ref().is_some_and(|job| job.id == id)
            || self.pending.iter().any(|p| p.job.id == id)
    }
}

struct Inner {
    state: Mutex<QueueState>,
    events: EventBus,
}

/// Single-flight FIFO scheduler
///
/// Cloning is cheap and every clone shares the same queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<Inner>,
}

impl AdmissionQueue {
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                events,
            }),
        }
    }

    /// Queue shared by every client in the process
    pub fn global() -> &'static AdmissionQueue {
        &GLOBAL_QUEUE
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Admit a job and return its queue position
    ///
    /// `task` is the job's work; it runs once the job reaches the front and
    /// the active slot is free. Returns 0 when the job was scheduled
    /// immediately.
    pub async fn enqueue<F>(&self, mut job: Job, task: F) -> Result<usize, QueueError>
    where
        F: Future<Output = Settlement> + Send + 'static,
    {
        let mut state = self.inner.state.lock().await;
        if state.contains(job.id) {
            return Err(QueueError::DuplicateJob(job.id));
        }

        let job_id = job.id;
        job.state = JobState::Queued;
        let pending = PendingJob {
            job,
            task: Box::pin(task),
        };

        let position = if state.active.is_none() && state.pending.is_empty() {
            0
        } else {
            state.pending.len() + 1
        };

        info!(job_id = %job_id, position = position, "Job admitted");
        self.inner.events.emit_lossy(AnalysisEvent::JobQueued {
            job_id,
            position,
            timestamp: Utc::now(),
        });

        if position == 0 {
            self.start(&mut state, pending);
        } else {
            state.pending.push_back(pending);
        }

        Ok(position)
    }

    /// Current position of a job, `None` once it has settled
    pub async fn position(&self, id: JobId) -> Option<usize> {
        let state = self.inner.state.lock().await;
        if state.active.as_ref().is_some_and(|job| job.id == id) {
            return Some(0);
        }
        state
            .pending
            .iter()
            .position(|p| p.job.id == id)
            .map(|index| index + 1)
    }

    /// Snapshot of a job with its current state and position
    pub async fn job(&self, id: JobId) -> Option<Job> {
        let state = self.inner.state.lock().await;
        if let Some(active) = state.active.as_ref().filter(|job| job.id == id) {
            return Some(active.clone());
        }
        state
            .pending
            .iter()
            .enumerate()
            .find(|(_, p)| p.job.id == id)
            .map(|(index, p)| {
                let mut job = p.job.clone();
                job.queue_position = Some(index + 1);
                job
            })
    }

    pub async fn active_job(&self) -> Option<JobId> {
        self.inner.state.lock().await.active.as_ref().map(|job| job.id)
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Cancel one job without affecting any other
    ///
    /// Safe to call repeatedly and after the job has settled.
    pub async fn cancel(&self, id: JobId) -> CancelOutcome {
        let mut state = self.inner.state.lock().await;

        if let Some(active) = state.active.as_ref().filter(|job| job.id == id) {
            active.cancellation.cancel();
            debug!(job_id = %id, "Cancellation signalled to active job");
            return CancelOutcome::Signalled;
        }

        let Some(index) = state.pending.iter().position(|p| p.job.id == id) else {
            return CancelOutcome::NotFound;
        };

        if let Some(removed) = state.pending.remove(index) {
            removed.job.cancellation.cancel();
        }
        info!(job_id = %id, "Queued job cancelled");
        self.inner.events.emit_lossy(AnalysisEvent::JobCancelled {
            job_id: id,
            timestamp: Utc::now(),
        });
        CancelOutcome::Dequeued
    }

    /// Mark the job active and spawn its task
    fn start(&self, state: &mut QueueState, pending: PendingJob) {
        let PendingJob { mut job, task } = pending;
        let job_id = job.id;

        job.state = JobState::Active;
        job.queue_position = Some(0);
        info!(
            job_id = %job_id,
            subject_url = %job.request.subject_url,
            mode = %job.request.mode,
            "Job started"
        );
        state.active = Some(job);

        self.inner.events.emit_lossy(AnalysisEvent::JobStarted {
            job_id,
            timestamp: Utc::now(),
        });

        let queue = self.clone();
        tokio::spawn(async move {
            let settlement = match tokio::spawn(task).await {
                Ok(settlement) => settlement,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Job task faulted");
                    Settlement::Failed {
                        category: String::new(),
                        message: format!("Analysis task faulted: {}", e),
                    }
                }
            };
            queue.on_task_settled(job_id, settlement).await;
        });
    }

    /// Clear the active slot, publish the settle event and schedule the next job
    async fn on_task_settled(&self, job_id: JobId, settlement: Settlement) {
        let mut state = self.inner.state.lock().await;

        if state.active.as_ref().is_some_and(|job| job.id == job_id) {
            state.active = None;
        }

        info!(job_id = %job_id, state = ?settlement.state(), "Job settled");
        let timestamp = Utc::now();
        self.inner.events.emit_lossy(match settlement {
            Settlement::Completed => AnalysisEvent::JobCompleted { job_id, timestamp },
            Settlement::Failed { category, message } => AnalysisEvent::JobFailed {
                job_id,
                category,
                message,
                timestamp,
            },
            Settlement::Cancelled => AnalysisEvent::JobCancelled { job_id, timestamp },
        });

        self.process_next(&mut state);
    }

    /// Start the next waiting job; no-op while a job is active
    fn process_next(&self, state: &mut QueueState) {
        if state.active.is_some() {
            return;
        }

        while let Some(next) = state.pending.pop_front() {
            if next.job.cancellation_requested() {
                debug!(job_id = %next.job.id, "Skipping job cancelled while queued");
                self.inner.events.emit_lossy(AnalysisEvent::JobCancelled {
                    job_id: next.job.id,
                    timestamp: Utc::now(),
                });
                continue;
            }
            self.start(state, next);
            return;
        }

        debug!("Admission queue idle");
    }
}
