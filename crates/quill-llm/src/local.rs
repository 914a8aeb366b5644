//! Local model process transport.
//!
//! Talks to a model-server process on localhost (llama.cpp / Ollama style):
//! one POST, newline-delimited JSON response chunks. There is no hard
//! timeout here — inline completion traffic is bounded by the tab
//! controller's debounce/cancel discipline — but process-level failures
//! (server not running, crash mid-stream) surface as `ModelProcess` errors
//! so the model manager can mark the record unhealthy.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::transport::{
    Transport, TransportError, TransportEvent, TransportEventStream, TransportRequest,
    TransportResult,
};
use quill_core::RunOutput;

/// Default local model server endpoint.
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://127.0.0.1:11434";

/// One newline-delimited JSON chunk from the local server.
#[derive(Debug, Deserialize)]
struct LocalChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Transport for a locally hosted model process.
pub struct LocalTransport {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LocalTransport {
    /// Create a transport bound to one local model.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// The model this transport is bound to.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn stream_internal(
        &self,
        request: &TransportRequest,
    ) -> TransportResult<TransportEventStream> {
        let url = format!("{}/api/generate", self.base_url);
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = json!({
            "model": model,
            "system": request.system_prompt,
            "prompt": request.user_content,
            "stream": true,
        });

        debug!(run_id = %request.run_id, model, "sending local generation request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::ModelProcess(format!("local server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(TransportError::ModelProcess(format!(
                "local server returned {status}: {body_text}"
            )));
        }

        let model = model.to_string();
        Ok(chunk_stream(response.bytes_stream(), model))
    }
}

/// Turn the server's byte stream into transport events.
///
/// Buffers bytes, splits on newlines, parses each line as a [`LocalChunk`],
/// and accumulates response text so the terminal `Done` carries the full
/// output. A mid-stream connection drop is a `ModelProcess` error.
fn chunk_stream<S, E>(bytes: S, model: String) -> TransportEventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send,
{
    let stream = async_stream::stream! {
        futures::pin_mut!(bytes);
        let mut buffer = String::new();
        let mut accumulated = String::new();

        'read: loop {
            match bytes.next().await {
                None => {
                    yield Err(TransportError::ModelProcess(
                        "local stream ended without a terminal chunk".into(),
                    ));
                    break 'read;
                }
                Some(Err(e)) => {
                    yield Err(TransportError::ModelProcess(format!("stream read failed: {e}")));
                    break 'read;
                }
                Some(Ok(chunk)) => {
                    match std::str::from_utf8(&chunk) {
                        Ok(text) => buffer.push_str(text),
                        Err(e) => {
                            yield Err(TransportError::Parse(format!("non-UTF-8 chunk: {e}")));
                            break 'read;
                        }
                    }

                    while let Some(newline) = buffer.find('\n') {
                        let line: String = buffer.drain(..=newline).collect();
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<LocalChunk>(line) {
                            Ok(chunk) => {
                                if let Some(message) = chunk.error {
                                    yield Err(TransportError::ModelProcess(message));
                                    break 'read;
                                }
                                if !chunk.response.is_empty() {
                                    accumulated.push_str(&chunk.response);
                                    yield Ok(TransportEvent::Delta { text: chunk.response });
                                }
                                if chunk.done {
                                    yield Ok(TransportEvent::Done {
                                        output: RunOutput {
                                            text: std::mem::take(&mut accumulated),
                                            model: Some(model.clone()),
                                        },
                                    });
                                    break 'read;
                                }
                            }
                            Err(e) => {
                                yield Err(TransportError::Parse(format!("bad chunk: {e}")));
                                break 'read;
                            }
                        }
                    }
                }
            }
        }
    };
    Box::pin(stream)
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip_all, fields(transport = "local", run_id = %request.run_id))]
    async fn stream(&self, request: &TransportRequest) -> TransportResult<TransportEventStream> {
        self.stream_internal(request).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use quill_core::RunId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> TransportRequest {
        TransportRequest {
            run_id: RunId::new(),
            system_prompt: "Continue the user's sentence.".into(),
            user_content: "The quick brown".into(),
            prefix_hash: "cafe".into(),
            model: None,
        }
    }

    async fn collect(
        mut stream: TransportEventStream,
    ) -> Vec<Result<TransportEvent, TransportError>> {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    fn bytes_ok(s: &str) -> Result<Bytes, std::convert::Infallible> {
        Ok(Bytes::copy_from_slice(s.as_bytes()))
    }

    // ── chunk_stream ────────────────────────────────────────────────────

    #[tokio::test]
    async fn parses_chunks_and_accumulates() {
        let body = futures::stream::iter(vec![
            bytes_ok("{\"response\":\" fox\",\"done\":false}\n"),
            bytes_ok("{\"response\":\" jumps\",\"done\":false}\n{\"done\":true}\n"),
        ]);
        let events = collect(chunk_stream(body, "qwen2.5-0.5b-instruct".into())).await;

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &TransportEvent::Delta { text: " fox".into() }
        );
        assert_matches!(
            events[2].as_ref().unwrap(),
            TransportEvent::Done { output } if output.text == " fox jumps"
                && output.model.as_deref() == Some("qwen2.5-0.5b-instruct")
        );
    }

    #[tokio::test]
    async fn split_chunk_across_reads_reassembles() {
        let body = futures::stream::iter(vec![
            bytes_ok("{\"response\":\"ab"),
            bytes_ok("c\",\"done\":false}\n{\"done\":true}\n"),
        ]);
        let events = collect(chunk_stream(body, "m".into())).await;

        assert_eq!(
            events[0].as_ref().unwrap(),
            &TransportEvent::Delta { text: "abc".into() }
        );
    }

    #[tokio::test]
    async fn error_chunk_surfaces_as_model_process() {
        let body = futures::stream::iter(vec![bytes_ok(
            "{\"error\":\"model not loaded\",\"done\":false}\n",
        )]);
        let events = collect(chunk_stream(body, "m".into())).await;

        assert_eq!(events.len(), 1);
        assert_matches!(
            events[0].as_ref().unwrap_err(),
            TransportError::ModelProcess(msg) if msg == "model not loaded"
        );
    }

    #[tokio::test]
    async fn dropped_connection_is_model_process_error() {
        let body = futures::stream::iter(vec![bytes_ok("{\"response\":\"x\",\"done\":false}\n")]);
        let events = collect(chunk_stream(body, "m".into())).await;

        assert_eq!(events.len(), 2);
        assert_matches!(events[1], Err(TransportError::ModelProcess(_)));
    }

    #[tokio::test]
    async fn nothing_after_terminal_chunk() {
        let body = futures::stream::iter(vec![bytes_ok(
            "{\"done\":true}\n{\"response\":\"late\",\"done\":false}\n",
        )]);
        let events = collect(chunk_stream(body, "m".into())).await;
        assert_eq!(events.len(), 1);
        assert_matches!(events[0].as_ref().unwrap(), TransportEvent::Done { .. });
    }

    // ── HTTP behavior ───────────────────────────────────────────────────

    #[tokio::test]
    async fn posts_to_generate_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"response\":\"hi\",\"done\":false}\n{\"done\":true}\n",
            ))
            .mount(&server)
            .await;

        let transport = LocalTransport::new(server.uri(), "qwen2.5-0.5b-instruct");
        let events = collect(transport.stream(&request()).await.unwrap()).await;

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn unreachable_server_is_model_process_error() {
        // Port 1 is never listening
        let transport = LocalTransport::new("http://127.0.0.1:1", "m");
        let err = transport.stream(&request()).await.err().unwrap();
        assert_matches!(err, TransportError::ModelProcess(_));
    }

    #[tokio::test]
    async fn server_error_status_is_model_process_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("loading"))
            .mount(&server)
            .await;

        let transport = LocalTransport::new(server.uri(), "m");
        let err = transport.stream(&request()).await.err().unwrap();
        assert_matches!(err, TransportError::ModelProcess(msg) if msg.contains("500"));
    }
}
