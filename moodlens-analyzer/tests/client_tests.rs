//! Integration tests for the analysis client
//!
//! Busy auto-retry, cancellation, recovery categories and queue position
//! reporting through the consumer-facing API. Time is paused so the busy
//! retry delay elapses instantly.

mod helpers;

use helpers::{collect_settles, ProgressLog, Response, ScriptedTransport, Step};
use moodlens_analyzer::client::TASK_FAULTED_MESSAGE;
use moodlens_analyzer::recovery::{BusyRetryPolicy, BUSY_RETRY_DELAY};
use moodlens_analyzer::{
    AdmissionQueue, AnalysisClient, AnalysisFailure, AnalysisMode, ClientSettings, RecoveryCategory,
    RecoveryOption, SubmitOptions, TransportError,
};
use moodlens_common::events::{AnalysisEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn client(transport: &Arc<ScriptedTransport>) -> AnalysisClient<Arc<ScriptedTransport>> {
    AnalysisClient::with_queue(
        Arc::clone(transport),
        AdmissionQueue::new(EventBus::new(256)),
        ClientSettings::default(),
    )
}

fn failure(outcome: Result<moodlens_analyzer::CanonicalReport, AnalysisFailure>) -> moodlens_analyzer::FailureReport {
    match outcome {
        Err(AnalysisFailure::Failed(report)) => report,
        other => panic!("expected classified failure, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_job_reports_progress_and_result() {
    let transport = Arc::new(ScriptedTransport::new(vec![Response::success("vision-v2")]));
    let client = client(&transport);
    let log = ProgressLog::default();
    let recorder = log.clone();

    let report = client
        .analyze(
            "https://img.test/dog.jpg",
            SubmitOptions::default()
                .mode(AnalysisMode::Local)
                .on_progress(move |text| recorder.record(text)),
        )
        .await
        .unwrap();

    assert_eq!(report.model_used, "vision-v2");
    assert_eq!(report.consensus_score, moodlens_analyzer::Score::Known(80.0));
    assert_eq!(log.entries(), vec!["Analyzing"]);
    assert_eq!(transport.requests()[0].mode, AnalysisMode::Local);
}

#[tokio::test(start_paused = true)]
async fn test_busy_failure_retried_exactly_once_after_delay() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::busy(),
        Response::success("after-retry"),
    ]));
    let client = client(&transport);
    let mut events = client.queue().events().subscribe();
    let started = Instant::now();

    let report = client
        .analyze("https://img.test/dog.jpg", SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(report.model_used, "after-retry");
    assert_eq!(transport.open_count(), 2);
    assert!(started.elapsed() >= BUSY_RETRY_DELAY);

    let mut saw_retry = false;
    while let Ok(event) = events.try_recv() {
        if let AnalysisEvent::RetryScheduled { delay_ms, .. } = event {
            assert_eq!(delay_ms, 3500);
            saw_retry = true;
        }
    }
    assert!(saw_retry);
}

#[tokio::test(start_paused = true)]
async fn test_second_busy_failure_is_surfaced_without_looping() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::busy(),
        Response::busy(),
        Response::success("never reached"),
    ]));
    let client = client(&transport);

    let report = failure(
        client
            .analyze("https://img.test/dog.jpg", SubmitOptions::default())
            .await,
    );

    assert_eq!(report.category, RecoveryCategory::RetryableBusy);
    assert!(report.retried);
    assert_eq!(transport.open_count(), 2);

    tokio::time::sleep(BUSY_RETRY_DELAY * 4).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_busy_status_before_body_is_retried() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::Refuse(TransportError::Status {
            status: 503,
            message: "Server busy".into(),
        }),
        Response::success("second"),
    ]));
    let client = client(&transport);

    let report = client
        .analyze("https://img.test/dog.jpg", SubmitOptions::default())
        .await
        .unwrap();
    assert_eq!(report.model_used, "second");
}

#[tokio::test(start_paused = true)]
async fn test_retry_disabled_by_policy() {
    let transport = Arc::new(ScriptedTransport::new(vec![Response::busy()]));
    let client = AnalysisClient::with_queue(
        Arc::clone(&transport),
        AdmissionQueue::new(EventBus::new(16)),
        ClientSettings {
            default_mode: AnalysisMode::Cloud,
            busy_retry: BusyRetryPolicy {
                delay: Duration::from_secs(1),
                max_retries: 0,
            },
        },
    );

    let report = failure(client.analyze("u", SubmitOptions::default()).await);
    assert!(report.is_busy());
    // No automatic retry will follow, so the report must say so.
    assert!(report.retried);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_retry_delay_is_final() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::busy(),
        Response::success("never reached"),
    ]));
    let client = client(&transport);
    let mut events = client.queue().events().subscribe();

    let submission = client.submit("https://img.test/dog.jpg", SubmitOptions::default()).await;
    let handle = submission.handle.clone();

    // Wait for the busy attempt to settle, then cancel inside the delay.
    collect_settles(&mut events, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.cancel(&handle).await;

    assert_eq!(submission.outcome().await, Err(AnalysisFailure::Cancelled));

    tokio::time::sleep(BUSY_RETRY_DELAY * 2).await;
    assert_eq!(transport.open_count(), 1);

    // Idempotent after settle.
    client.cancel(&handle).await;
    client.cancel(&handle).await;
}

#[tokio::test(start_paused = true)]
async fn test_dropped_submission_skips_busy_retry() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::busy(),
        Response::success("never reached"),
    ]));
    let client = client(&transport);
    let mut events = client.queue().events().subscribe();

    let submission = client.submit("https://img.test/dog.jpg", SubmitOptions::default()).await;
    drop(submission);

    collect_settles(&mut events, 1).await;
    tokio::time::sleep(BUSY_RETRY_DELAY * 2).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_yields_degraded_report() {
    let transport = Arc::new(ScriptedTransport::new(vec![Response::lines(&[
        r#"{"type":"progress","message":"Scoring"}"#,
        r#"{"type":"error","error":"Scoring stage failed","partial":{"ai_analysis":{"dominant_emotion":"Alert","tags":["Focused"]}},"raw_comments":["intense stare"]}"#,
    ])]));
    let client = client(&transport);

    let report = failure(client.analyze("u", SubmitOptions::default()).await);

    let RecoveryCategory::PartialAvailable(partial) = &report.category else {
        panic!("expected partial, got {:?}", report.category);
    };
    assert_eq!(partial.ai_dominant_emotion, "Alert");
    assert!(!partial.trainability_score.is_known());
    assert_eq!(partial.raw_comments, vec!["intense stare"]);
    assert_eq!(
        report.options,
        vec![RecoveryOption::ViewSample, RecoveryOption::RetrySameProvider(AnalysisMode::Cloud)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_raw_only_failure_keeps_comments() {
    let transport = Arc::new(ScriptedTransport::new(vec![Response::lines(&[
        r#"{"type":"error","error":"Vision provider offline","raw_comments":["fluffy!","tiny paws"]}"#,
    ])]));
    let client = client(&transport);

    let report = failure(client.analyze("u", SubmitOptions::default()).await);

    let RecoveryCategory::RawOnlyAvailable(raw) = &report.category else {
        panic!("expected raw-only, got {:?}", report.category);
    };
    assert_eq!(raw.raw_comments, vec!["fluffy!", "tiny paws"]);
    assert_eq!(raw.ai_dominant_emotion, moodlens_analyzer::models::UNKNOWN);
}

#[tokio::test(start_paused = true)]
async fn test_hard_failure_offers_alternate_provider() {
    let transport = Arc::new(ScriptedTransport::new(vec![Response::Refuse(TransportError::Connect(
        "connection refused".into(),
    ))]));
    let client = client(&transport);

    let report = failure(
        client
            .analyze("u", SubmitOptions::default().mode(AnalysisMode::Local))
            .await,
    );

    assert_eq!(report.category, RecoveryCategory::HardFailure);
    assert_eq!(report.message, "connection refused");
    assert!(report.options.contains(&RecoveryOption::SwitchProvider(AnalysisMode::Cloud)));
    assert!(report.options.contains(&RecoveryOption::ViewSample));
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stream_without_terminal_is_hard_failure() {
    let transport = Arc::new(ScriptedTransport::new(vec![Response::lines(&[
        r#"{"type":"progress","message":"Working"}"#,
    ])]));
    let client = client(&transport);

    let report = failure(client.analyze("u", SubmitOptions::default()).await);
    assert_eq!(report.category, RecoveryCategory::HardFailure);
    assert_eq!(report.message, "Stream ended without final result.");
}

#[tokio::test(start_paused = true)]
async fn test_queue_positions_and_cancellation_isolation() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::Body(vec![
            Step::Chunk(b"{\"type\":\"progress\",\"message\":\"a\"}\n".to_vec()),
            Step::Delay(Duration::from_secs(2)),
            Step::Chunk(b"{\"type\":\"result\",\"data\":{\"model\":\"first\"}}\n".to_vec()),
        ]),
        Response::success("third"),
    ]));
    let client = client(&transport);

    let first = client.submit("https://img.test/1.jpg", SubmitOptions::default()).await;
    let second = client.submit("https://img.test/2.jpg", SubmitOptions::default()).await;
    let third = client.submit("https://img.test/3.jpg", SubmitOptions::default()).await;

    assert_eq!(first.position, 0);
    assert_eq!(second.position, 1);
    assert_eq!(third.position, 2);
    assert_eq!(client.get_queue_position(&third.handle).await, Some(2));

    client.cancel(&second.handle).await;
    assert_eq!(client.get_queue_position(&second.handle).await, None);
    assert!(!third.handle.is_cancelled());

    let third_handle = third.handle.clone();
    assert_eq!(second.outcome().await, Err(AnalysisFailure::Cancelled));
    assert_eq!(first.outcome().await.unwrap().model_used, "first");
    assert_eq!(third.outcome().await.unwrap().model_used, "third");
    assert_eq!(client.get_queue_position(&third_handle).await, None);

    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_ahead_compacts_position_without_reordering() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::Body(vec![
            Step::Delay(Duration::from_secs(2)),
            Step::Chunk(b"{\"type\":\"result\",\"data\":{\"model\":\"first\"}}\n".to_vec()),
        ]),
        Response::success("third"),
    ]));
    let client = client(&transport);

    let first = client.submit("https://img.test/1.jpg", SubmitOptions::default()).await;
    let second = client.submit("https://img.test/2.jpg", SubmitOptions::default()).await;
    let third = client.submit("https://img.test/3.jpg", SubmitOptions::default()).await;
    let fourth = client.submit("https://img.test/4.jpg", SubmitOptions::default()).await;
    assert_eq!(client.get_queue_position(&third.handle).await, Some(2));

    // Cancelling behind third leaves its position alone.
    client.cancel(&fourth.handle).await;
    assert_eq!(client.get_queue_position(&third.handle).await, Some(2));

    // Cancelling ahead of third moves it one step closer to the front.
    client.cancel(&second.handle).await;
    assert_eq!(client.get_queue_position(&third.handle).await, Some(1));
    assert!(!third.handle.is_cancelled());

    assert_eq!(second.outcome().await, Err(AnalysisFailure::Cancelled));
    assert_eq!(fourth.outcome().await, Err(AnalysisFailure::Cancelled));
    assert_eq!(first.outcome().await.unwrap().model_used, "first");
    assert_eq!(third.outcome().await.unwrap().model_used, "third");

    let subjects: Vec<String> = transport.requests().into_iter().map(|r| r.subject_url).collect();
    assert_eq!(subjects, vec!["https://img.test/1.jpg", "https://img.test/3.jpg"]);
}

#[tokio::test(start_paused = true)]
async fn test_faulted_job_is_hard_failure_and_queue_continues() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::success("faulted"),
        Response::success("next"),
    ]));
    let client = client(&transport);

    let faulted = client
        .submit(
            "https://img.test/bad.jpg",
            SubmitOptions::default().on_progress(|_| panic!("progress renderer crashed")),
        )
        .await;
    let next = client.submit("https://img.test/ok.jpg", SubmitOptions::default()).await;

    let report = failure(faulted.outcome().await);
    assert_eq!(report.category, RecoveryCategory::HardFailure);
    assert_eq!(report.message, TASK_FAULTED_MESSAGE);
    assert!(!report.options.is_empty());
    assert!(report.options.contains(&RecoveryOption::SwitchProvider(AnalysisMode::Local)));

    assert_eq!(next.outcome().await.unwrap().model_used, "next");
}

#[tokio::test(start_paused = true)]
async fn test_clients_on_global_queue_share_single_flight() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Response::Body(vec![
            Step::Delay(Duration::from_millis(500)),
            Step::Chunk(b"{\"type\":\"result\",\"data\":{\"model\":\"m0\"}}\n".to_vec()),
        ]),
        Response::success("m1"),
    ]));
    let widget_a = AnalysisClient::new(Arc::clone(&transport), ClientSettings::default());
    let widget_b = AnalysisClient::new(Arc::clone(&transport), ClientSettings::default());

    let s1 = widget_a.submit("a1", SubmitOptions::default()).await;
    let s2 = widget_b.submit("b1", SubmitOptions::default()).await;

    assert_eq!(s1.position, 0);
    assert_eq!(s2.position, 1);
    assert_eq!(widget_a.get_queue_position(&s2.handle).await, Some(1));

    assert_eq!(s1.outcome().await.unwrap().model_used, "m0");
    assert_eq!(s2.outcome().await.unwrap().model_used, "m1");
    assert_eq!(transport.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_parent_token_cancels_job() {
    let transport = Arc::new(ScriptedTransport::new(vec![Response::Body(vec![
        Step::Chunk(b"{\"type\":\"progress\",\"message\":\"a\"}\n".to_vec()),
        Step::Hang,
    ])]));
    let client = client(&transport);
    let scope = CancellationToken::new();

    let submission = client
        .submit("u", SubmitOptions::default().cancellation(scope.clone()))
        .await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    scope.cancel();

    assert_eq!(submission.outcome().await, Err(AnalysisFailure::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_clients_sharing_a_queue_run_one_job_at_a_time() {
    let transport = Arc::new(ScriptedTransport::new(
        (0..4)
            .map(|i| {
                Response::Body(vec![
                    Step::Delay(Duration::from_millis(300)),
                    Step::Chunk(format!("{{\"type\":\"result\",\"data\":{{\"model\":\"m{}\"}}}}\n", i).into_bytes()),
                ])
            })
            .collect(),
    ));
    let queue = AdmissionQueue::new(EventBus::new(64));
    let widget_a = AnalysisClient::with_queue(Arc::clone(&transport), queue.clone(), ClientSettings::default());
    let widget_b = AnalysisClient::with_queue(Arc::clone(&transport), queue.clone(), ClientSettings::default());

    let s1 = widget_a.submit("a1", SubmitOptions::default()).await;
    let s2 = widget_b.submit("b1", SubmitOptions::default()).await;
    let s3 = widget_a.submit("a2", SubmitOptions::default()).await;
    let s4 = widget_b.submit("b2", SubmitOptions::default()).await;

    let models: Vec<String> = futures::future::join_all([s1.outcome(), s2.outcome(), s3.outcome(), s4.outcome()])
        .await
        .into_iter()
        .map(|outcome| outcome.unwrap().model_used)
        .collect();

    assert_eq!(models, vec!["m0", "m1", "m2", "m3"]);
    assert_eq!(transport.max_in_flight(), 1);
    let subjects: Vec<String> = transport.requests().into_iter().map(|r| r.subject_url).collect();
    assert_eq!(subjects, vec!["a1", "b1", "a2", "b2"]);
}
