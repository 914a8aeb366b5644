//! Scripted transport for deterministic tests without any network.
//!
//! Responses are consumed in call order. Each response is either an error
//! from `stream()` itself or a sequence of steps replayed as the stream is
//! polled; steps can pause, which is how tests stage "deltas still buffered
//! when cancel lands" scenarios.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::transport::{
    Transport, TransportError, TransportEvent, TransportEventStream, TransportRequest,
    TransportResult,
};
use quill_core::RunOutput;

/// One step of a scripted stream.
#[derive(Clone, Debug)]
pub enum MockStep {
    /// Yield a transport event.
    Event(TransportEvent),
    /// Yield a transport error (terminal).
    Fail(TransportError),
    /// Sleep before the next step.
    Wait(Duration),
}

/// One pre-programmed response.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Replay these steps as the stream is polled.
    Stream(Vec<MockStep>),
    /// Fail the `stream()` call itself.
    Error(TransportError),
}

impl MockResponse {
    /// Delta per fragment, then `Done` with the concatenated text.
    pub fn text_chunks(chunks: &[&str]) -> Self {
        let mut steps: Vec<MockStep> = chunks
            .iter()
            .map(|c| MockStep::Event(TransportEvent::Delta { text: (*c).to_string() }))
            .collect();
        steps.push(MockStep::Event(TransportEvent::Done {
            output: RunOutput::text(chunks.concat()),
        }));
        Self::Stream(steps)
    }

    /// Like [`text_chunks`](Self::text_chunks) with a pause between steps.
    pub fn text_chunks_with_delay(chunks: &[&str], delay: Duration) -> Self {
        let mut steps = Vec::with_capacity(chunks.len() * 2 + 1);
        for chunk in chunks {
            steps.push(MockStep::Wait(delay));
            steps.push(MockStep::Event(TransportEvent::Delta {
                text: (*chunk).to_string(),
            }));
        }
        steps.push(MockStep::Event(TransportEvent::Done {
            output: RunOutput::text(chunks.concat()),
        }));
        Self::Stream(steps)
    }

    /// A stream that emits one delta then fails.
    pub fn delta_then_error(text: &str, error: TransportError) -> Self {
        Self::Stream(vec![
            MockStep::Event(TransportEvent::Delta { text: text.to_string() }),
            MockStep::Fail(error),
        ])
    }

    /// A stream that never produces anything (until dropped).
    pub fn hang() -> Self {
        Self::Stream(vec![MockStep::Wait(Duration::from_secs(3600))])
    }
}

/// Transport returning pre-programmed responses in sequence.
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<TransportRequest>>,
    call_count: AtomicUsize,
}

impl MockTransport {
    /// Create a mock with scripted responses.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of `stream()` calls so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests captured from every `stream()` call, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// Append another scripted response.
    pub fn push_response(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn stream(&self, request: &TransportRequest) -> TransportResult<TransportEventStream> {
        let _ = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let response = self.responses.lock().pop_front().ok_or_else(|| {
            TransportError::Provider("MockTransport: no response configured".into())
        })?;

        match response {
            MockResponse::Error(e) => Err(e),
            MockResponse::Stream(steps) => {
                let stream = async_stream::stream! {
                    for step in steps {
                        match step {
                            MockStep::Wait(duration) => tokio::time::sleep(duration).await,
                            MockStep::Event(event) => yield Ok(event),
                            MockStep::Fail(error) => {
                                yield Err(error);
                                break;
                            }
                        }
                    }
                };
                Ok(Box::pin(stream))
            }
        }
    }
}
