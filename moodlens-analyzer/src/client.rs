//! Consumer-facing analysis client
//!
//! `submit` admits a job to the shared [`AdmissionQueue`] and returns a
//! [`Submission`] whose outcome resolves to a report or a classified
//! failure. A Retryable-Busy failure is re-admitted once, under the same
//! handle, after the policy delay; cancellation is always final.

use crate::error::{AnalysisFailure, SessionError};
use crate::models::{AnalysisMode, AnalysisRequest, CanonicalReport, Job, JobId};
use crate::queue::{AdmissionQueue, Settlement};
use crate::recovery::{classify_failure, BusyRetryPolicy, FailureReport};
use crate::session::{ProgressCallback, StreamSession};
use crate::transport::Transport;
use chrono::Utc;
use moodlens_common::events::AnalysisEvent;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Outcome = Result<CanonicalReport, AnalysisFailure>;

/// Message of the hard failure reported when a job's task panicked
pub const TASK_FAULTED_MESSAGE: &str = "Analysis task faulted";

/// Per-submission options
#[derive(Clone, Default)]
pub struct SubmitOptions {
    /// Provider; the client default when `None`
    pub mode: Option<AnalysisMode>,
    pub on_progress: Option<ProgressCallback>,
    /// Parent token; cancelling it cancels this job
    pub cancellation: Option<CancellationToken>,
}

impl SubmitOptions {
    pub fn mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Handle for querying or cancelling a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    mode: AnalysisMode,
    cancellation: CancellationToken,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A submitted job
///
/// Dropping the submission before it settles tells the client nobody is
/// waiting, which suppresses the automatic busy retry.
pub struct Submission {
    pub handle: JobHandle,
    /// Position at admission (0 = started immediately)
    pub position: usize,
    outcome: oneshot::Receiver<Outcome>,
}

impl Submission {
    /// Wait for the job to settle
    pub async fn outcome(self) -> Outcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) if self.handle.is_cancelled() => Err(AnalysisFailure::Cancelled),
            Err(_) => Err(AnalysisFailure::Failed(FailureReport::hard(
                "Analysis ended without an outcome",
                self.handle.mode,
            ))),
        }
    }
}

/// Client settings
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub default_mode: AnalysisMode,
    pub busy_retry: BusyRetryPolicy,
}

/// Analysis client over a transport and an admission queue
pub struct AnalysisClient<T: Transport + 'static> {
    transport: Arc<T>,
    queue: AdmissionQueue,
    settings: ClientSettings,
}

impl<T: Transport + 'static> Clone for AnalysisClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            queue: self.queue.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Everything one attempt needs, shared across the retry
struct AttemptContext<T: Transport + 'static> {
    transport: Arc<T>,
    queue: AdmissionQueue,
    id: JobId,
    request: AnalysisRequest,
    cancellation: CancellationToken,
    on_progress: Option<ProgressCallback>,
    policy: BusyRetryPolicy,
}

impl<T: Transport + 'static> Clone for AttemptContext<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            queue: self.queue.clone(),
            id: self.id,
            request: self.request.clone(),
            cancellation: self.cancellation.clone(),
            on_progress: self.on_progress.clone(),
            policy: self.policy,
        }
    }
}

impl<T: Transport + 'static> AnalysisClient<T> {
    /// Client on the process-wide queue
    pub fn new(transport: T, settings: ClientSettings) -> Self {
        Self::with_queue(transport, AdmissionQueue::global().clone(), settings)
    }

    pub fn with_queue(transport: T, queue: AdmissionQueue, settings: ClientSettings) -> Self {
        Self {
            transport: Arc::new(transport),
            queue,
            settings,
        }
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Admit one analysis job
    pub async fn submit(&self, subject_url: impl Into<String>, options: SubmitOptions) -> Submission {
        let id = Uuid::new_v4();
        let mode = options.mode.unwrap_or(self.settings.default_mode);
        let cancellation = options
            .cancellation
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        let context = AttemptContext {
            transport: Arc::clone(&self.transport),
            queue: self.queue.clone(),
            id,
            request: AnalysisRequest::new(subject_url, mode),
            cancellation: cancellation.clone(),
            on_progress: options.on_progress,
            policy: self.settings.busy_retry,
        };

        info!(
            job_id = %id,
            subject_url = %context.request.subject_url,
            mode = %mode,
            "Submitting analysis job"
        );

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (position, first_attempt) = match context.admit(0).await {
            Ok(admitted) => admitted,
            Err(failure) => {
                let _ = outcome_tx.send(Err(failure));
                return Submission {
                    handle: JobHandle { id, mode, cancellation },
                    position: 0,
                    outcome: outcome_rx,
                };
            }
        };

        tokio::spawn(supervise(context, first_attempt, outcome_tx));

        Submission {
            handle: JobHandle { id, mode, cancellation },
            position,
            outcome: outcome_rx,
        }
    }

    /// Submit and wait for the outcome
    pub async fn analyze(&self, subject_url: impl Into<String>, options: SubmitOptions) -> Outcome {
        self.submit(subject_url, options).await.outcome().await
    }

    /// Position while queued (0 = running), `None` once settled or between retry attempts
    pub async fn get_queue_position(&self, handle: &JobHandle) -> Option<usize> {
        self.queue.position(handle.id).await
    }

    /// Cancel a job; idempotent and safe after the job settled
    pub async fn cancel(&self, handle: &JobHandle) {
        handle.cancellation.cancel();
        let outcome = self.queue.cancel(handle.id).await;
        debug!(job_id = %handle.id, outcome = ?outcome, "Cancel requested");
    }
}

impl<T: Transport + 'static> AttemptContext<T> {
    /// Enqueue one attempt; the receiver yields its outcome
    ///
    /// `retries_used` counts busy retries spent before this attempt.
    async fn admit(&self, retries_used: u32) -> Result<(usize, oneshot::Receiver<Outcome>), AnalysisFailure> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job::new(self.id, self.request.clone(), self.cancellation.clone());

        let position = self
            .queue
            .enqueue(job, self.clone().run_attempt(retries_used, reply_tx))
            .await
            .map_err(|e| AnalysisFailure::Failed(FailureReport::hard(e.to_string(), self.request.mode)))?;

        Ok((position, reply_rx))
    }

    /// The work the queue runs when this attempt becomes active
    fn run_attempt(self, retries_used: u32, reply: oneshot::Sender<Outcome>) -> impl Future<Output = Settlement> + Send {
        async move {
            let retried = retries_used >= self.policy.max_retries;
            let session = StreamSession::new(self.id, self.request.clone(), self.cancellation.clone())
                .with_progress(self.progress_forwarder());

            let result = session.run(self.transport.as_ref()).await;
            let (settlement, outcome) = match result {
                Ok(report) => (Settlement::Completed, Ok(report)),
                Err(SessionError::Cancelled) => (Settlement::Cancelled, Err(AnalysisFailure::Cancelled)),
                Err(error) => match classify_failure(&error, self.request.mode, retried) {
                    Some(report) => {
                        warn!(
                            job_id = %self.id,
                            category = report.category.name(),
                            error = %report.message,
                            "Analysis attempt failed"
                        );
                        (
                            Settlement::Failed {
                                category: report.category.name().to_string(),
                                message: report.message.clone(),
                            },
                            Err(AnalysisFailure::Failed(report)),
                        )
                    }
                    None => (Settlement::Cancelled, Err(AnalysisFailure::Cancelled)),
                },
            };

            let _ = reply.send(outcome);
            settlement
        }
    }

    /// Progress callback that also publishes `JobProgress` events
    fn progress_forwarder(&self) -> ProgressCallback {
        let events = self.queue.events().clone();
        let job_id = self.id;
        let consumer = self.on_progress.clone();
        Arc::new(move |text: &str| {
            events.emit_lossy(AnalysisEvent::JobProgress {
                job_id,
                message: text.to_string(),
                timestamp: Utc::now(),
            });
            if let Some(callback) = &consumer {
                callback(text);
            }
        })
    }
}

/// Await each attempt and apply the busy retry policy
async fn supervise<T: Transport + 'static>(
    context: AttemptContext<T>,
    first_attempt: oneshot::Receiver<Outcome>,
    mut outcome_tx: oneshot::Sender<Outcome>,
) {
    let policy = context.policy;
    let mut attempt = first_attempt;
    let mut retries_used = 0;

    loop {
        // The reply is dropped when the queue discards a cancelled attempt
        // unrun, or when the attempt's task panicked.
        let outcome = match attempt.await {
            Ok(outcome) => outcome,
            Err(_) if context.cancellation.is_cancelled() => Err(AnalysisFailure::Cancelled),
            Err(_) => {
                warn!(job_id = %context.id, "Analysis task ended without a reply");
                Err(AnalysisFailure::Failed(FailureReport::hard(
                    TASK_FAULTED_MESSAGE,
                    context.request.mode,
                )))
            }
        };

        let busy = matches!(&outcome, Err(AnalysisFailure::Failed(report)) if report.is_busy());
        if !busy || retries_used >= policy.max_retries {
            let _ = outcome_tx.send(outcome);
            return;
        }

        if context.cancellation.is_cancelled() {
            let _ = outcome_tx.send(Err(AnalysisFailure::Cancelled));
            return;
        }
        if outcome_tx.is_closed() {
            debug!(job_id = %context.id, "Submission dropped; skipping busy retry");
            return;
        }

        retries_used += 1;
        let delay_ms = u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX);
        info!(job_id = %context.id, delay_ms = delay_ms, "Service busy; retrying once after delay");
        context.queue.events().emit_lossy(AnalysisEvent::RetryScheduled {
            job_id: context.id,
            delay_ms,
            timestamp: Utc::now(),
        });

        tokio::select! {
            biased;
            _ = context.cancellation.cancelled() => {
                debug!(job_id = %context.id, "Cancelled during busy retry delay");
                context.queue.events().emit_lossy(AnalysisEvent::JobCancelled {
                    job_id: context.id,
                    timestamp: Utc::now(),
                });
                let _ = outcome_tx.send(Err(AnalysisFailure::Cancelled));
                return;
            }
            _ = outcome_tx.closed() => {
                debug!(job_id = %context.id, "Submission dropped during busy retry delay");
                return;
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }

        match context.admit(retries_used).await {
            Ok((_, next)) => attempt = next,
            Err(failure) => {
                let _ = outcome_tx.send(Err(failure));
                return;
            }
        }
    }
}
