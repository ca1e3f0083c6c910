//! Shared test helpers
//!
//! - `ScriptedTransport`: replays scripted response bodies, one per `open`
//! - chunk splitters for feeding NDJSON in awkward pieces
//! - event collection from the `EventBus`

#![allow(dead_code)]

use async_trait::async_trait;
use moodlens_analyzer::models::AnalysisRequest;
use moodlens_analyzer::transport::{ChunkStream, Transport, TransportError};
use moodlens_common::events::AnalysisEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// One step of a scripted response body
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(Vec<u8>),
    Delay(Duration),
    Fail(TransportError),
    /// Never yields again
    Hang,
}

/// Scripted reply to one `open` call
#[derive(Debug, Clone)]
pub enum Response {
    Body(Vec<Step>),
    Refuse(TransportError),
}

impl Response {
    /// Whole body in one chunk
    pub fn lines(lines: &[&str]) -> Self {
        Self::Body(vec![Step::Chunk(ndjson(lines).into_bytes())])
    }

    /// Body split into chunks of `size` bytes
    pub fn chunked(lines: &[&str], size: usize) -> Self {
        Self::Body(split_bytes(ndjson(lines).as_bytes(), size))
    }

    pub fn busy() -> Self {
        Self::lines(&[
            r#"{"type":"progress","message":"Queued at service"}"#,
            r#"{"type":"error","error":"Server is busy processing another image"}"#,
        ])
    }

    pub fn success(model: &str) -> Self {
        let result = format!(
            r#"{{"type":"result","data":{{"model_used":"{}","trainability_score":80,"aggregate":{{"dominant_emotion":"Happy","variability_score":20}}}}}}"#,
            model
        );
        Self::Body(vec![
            Step::Chunk(b"{\"type\":\"progress\",\"message\":\"Analyzing\"}\n".to_vec()),
            Step::Chunk(format!("{}\n", result).into_bytes()),
        ])
    }
}

/// Lines joined with `\n`, newline-terminated
pub fn ndjson(lines: &[&str]) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

pub fn split_bytes(body: &[u8], size: usize) -> Vec<Step> {
    body.chunks(size.max(1)).map(|c| Step::Chunk(c.to_vec())).collect()
}

/// Transport replaying scripted responses in call order
///
/// Tracks how many bodies are open at once so tests can assert the
/// single-flight invariant.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Response>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Response>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn push(&self, response: Response) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn open_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter when the body is dropped
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: &AnalysisRequest) -> Result<ChunkStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Response::Refuse(TransportError::Connect("no scripted response".into())));

        let steps = match response {
            Response::Refuse(error) => return Err(error),
            Response::Body(steps) => steps,
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let stream = async_stream::stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    Step::Chunk(bytes) => yield Ok(bytes),
                    Step::Delay(duration) => tokio::time::sleep(duration).await,
                    Step::Fail(error) => {
                        yield Err(error);
                        break;
                    }
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Drain events until `count` settle events arrived
pub async fn collect_settles(
    rx: &mut broadcast::Receiver<AnalysisEvent>,
    count: usize,
) -> Vec<AnalysisEvent> {
    let mut settles = Vec::new();
    while settles.len() < count {
        let event = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for settle event")
            .expect("event bus closed");
        if event.is_settle() {
            settles.push(event);
        }
    }
    settles
}

/// Recorder for progress callbacks
#[derive(Clone, Default)]
pub struct ProgressLog(Arc<Mutex<Vec<String>>>);

impl ProgressLog {
    pub fn record(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
