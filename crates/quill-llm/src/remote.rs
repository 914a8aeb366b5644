//! Remote provider transport.
//!
//! POSTs the assembled request and consumes the provider's SSE response.
//! Each SSE `data:` payload is one JSON wire event (`delta`, `done`,
//! `error`). The stable prefix hash travels as a header so the provider
//! can validate cached prompt-prefix work; no prompt content appears in
//! headers or logs.
//!
//! An inactivity timeout guards the stream: if no event arrives within the
//! configured window the run fails with `InactivityTimeout`, which is a
//! transport error, never a cancellation.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, instrument};

use crate::transport::{
    Transport, TransportError, TransportEvent, TransportEventStream, TransportRequest,
    TransportResult,
};
use quill_core::RunOutput;

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.quill.dev";

/// Default inactivity window.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the stable prefix hash.
const PREFIX_HASH_HEADER: &str = "x-prompt-prefix-hash";

/// Configuration for the remote transport.
///
/// Credentials and proxy routing are read-only inputs resolved by the
/// caller (settings + credential source) before construction.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    /// Bearer API key.
    pub api_key: String,
    /// Provider base URL.
    pub base_url: String,
    /// Proxy base URL override. Takes precedence over `base_url` when set.
    pub proxy_base_url: Option<String>,
    /// Model requested for skill runs.
    pub model: String,
    /// Inactivity window after which the stream errors out.
    pub inactivity_timeout: Duration,
}

impl RemoteConfig {
    /// Config with defaults for everything except credentials and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy_base_url: None,
            model: model.into(),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
        }
    }

    fn effective_base_url(&self) -> &str {
        self.proxy_base_url.as_deref().unwrap_or(&self.base_url)
    }
}

/// One JSON payload on the provider's SSE stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireEvent {
    Delta {
        text: String,
    },
    Done {
        #[serde(default)]
        model: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Remote network provider transport.
pub struct RemoteTransport {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemoteTransport {
    /// Create a new remote transport.
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create a remote transport with a shared HTTP client.
    #[must_use]
    pub fn with_client(config: RemoteConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn build_headers(&self, request: &TransportRequest) -> TransportResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = format!("Bearer {}", self.config.api_key);
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| TransportError::AuthenticationFailed(format!("invalid API key: {e}")))?,
        );
        let _ = headers.insert(
            PREFIX_HASH_HEADER,
            HeaderValue::from_str(&request.prefix_hash)
                .map_err(|e| TransportError::Parse(format!("invalid prefix hash header: {e}")))?,
        );
        Ok(headers)
    }

    async fn stream_internal(
        &self,
        request: &TransportRequest,
    ) -> TransportResult<TransportEventStream> {
        let url = format!("{}/v1/generate", self.config.effective_base_url());
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let body = json!({
            "model": model,
            "system": request.system_prompt,
            "input": request.user_content,
            "stream": true,
        });

        debug!(
            run_id = %request.run_id,
            model,
            proxied = self.config.proxy_base_url.is_some(),
            "sending remote generation request"
        );

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers(request)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let err = TransportError::from_status(status.as_u16(), body_text);
            error!(
                run_id = %request.run_id,
                status = status.as_u16(),
                category = err.category(),
                "remote provider rejected request"
            );
            return Err(err);
        }

        let data_lines = response
            .bytes_stream()
            .eventsource()
            .map(|item| match item {
                Ok(event) => Ok(event.data),
                Err(e) => Err(TransportError::Parse(e.to_string())),
            });

        Ok(wire_stream(data_lines, self.config.inactivity_timeout))
    }
}

/// Turn a stream of SSE `data:` payloads into transport events.
///
/// Applies the inactivity timeout between items, accumulates delta text so
/// the terminal `Done` carries the full output, and ends the stream after
/// the first terminal item.
fn wire_stream<S>(data_lines: S, idle: Duration) -> TransportEventStream
where
    S: Stream<Item = Result<String, TransportError>> + Send + 'static,
{
    let stream = async_stream::stream! {
        futures::pin_mut!(data_lines);
        let mut accumulated = String::new();
        loop {
            let next = tokio::time::timeout(idle, data_lines.next()).await;
            match next {
                Err(_) => {
                    yield Err(TransportError::InactivityTimeout(idle));
                    break;
                }
                Ok(None) => {
                    yield Err(TransportError::Parse(
                        "stream ended without a terminal event".into(),
                    ));
                    break;
                }
                Ok(Some(Err(e))) => {
                    yield Err(e);
                    break;
                }
                Ok(Some(Ok(data))) => match serde_json::from_str::<WireEvent>(&data) {
                    Ok(WireEvent::Delta { text }) => {
                        accumulated.push_str(&text);
                        yield Ok(TransportEvent::Delta { text });
                    }
                    Ok(WireEvent::Done { model }) => {
                        yield Ok(TransportEvent::Done {
                            output: RunOutput {
                                text: std::mem::take(&mut accumulated),
                                model,
                            },
                        });
                        break;
                    }
                    Ok(WireEvent::Error { message }) => {
                        yield Err(TransportError::Provider(message));
                        break;
                    }
                    Err(e) => {
                        yield Err(TransportError::Parse(format!("bad wire event: {e}")));
                        break;
                    }
                },
            }
        }
    };
    Box::pin(stream)
}

#[async_trait]
impl Transport for RemoteTransport {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn validate_config(&self) -> Result<(), String> {
        if self.config.api_key.trim().is_empty() {
            return Err("missing remote API key".into());
        }
        if self
            .config
            .proxy_base_url
            .as_ref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err("proxy enabled with an empty base URL".into());
        }
        Ok(())
    }

    #[instrument(skip_all, fields(transport = "remote", run_id = %request.run_id))]
    async fn stream(&self, request: &TransportRequest) -> TransportResult<TransportEventStream> {
        self.stream_internal(request).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
