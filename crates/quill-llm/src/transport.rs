//! # Transport Trait
//!
//! Core abstraction over generation backends. Both implementations (remote
//! network provider, local model process) expose the same contract: accept
//! a fully assembled request, return an event stream immediately, push zero
//! or more deltas then exactly one terminal item.
//!
//! Deltas for a single run arrive in production order; across runs no
//! ordering is guaranteed. Abort is driven by the caller dropping or
//! ceasing to poll the stream — the run registry enforces that no delta is
//! observable after cancellation.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use quill_core::{RunErrorInfo, RunId, RunOutput};

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed stream of transport events returned by [`Transport::stream`].
pub type TransportEventStream =
    Pin<Box<dyn Stream<Item = Result<TransportEvent, TransportError>> + Send>>;

/// Events produced by a transport for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Ordered, append-only text fragment.
    Delta {
        /// The generated fragment.
        text: String,
    },
    /// Successful completion with the accumulated output. Terminal.
    Done {
        /// Full output of the run.
        output: RunOutput,
    },
}

/// Fully assembled, validated generation request.
///
/// Transports receive only this value plus the run id for logging; the run
/// record itself stays owned by the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    /// Id of the run this request belongs to.
    pub run_id: RunId,
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Rendered user content.
    pub user_content: String,
    /// Stable prefix hash, forwarded so providers can validate cached
    /// prompt-prefix work. Content-free.
    pub prefix_hash: String,
    /// Model override, when the caller pins one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Errors from transport operations.
///
/// All variants own plain data so events stay `Clone` across the run
/// registry's fan-out.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Credentials rejected (expired key, invalid token).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Provider returned an HTTP-level error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Provider signalled an error inside an otherwise healthy stream.
    #[error("provider error: {0}")]
    Provider(String),

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The event stream carried something unparseable.
    #[error("stream parse error: {0}")]
    Parse(String),

    /// No event arrived within the inactivity window. Distinct from
    /// [`Cancelled`](Self::Cancelled) so UIs can tell "gave up" from
    /// "you stopped it".
    #[error("no stream activity for {0:?}")]
    InactivityTimeout(Duration),

    /// The local model process failed or is unreachable.
    #[error("local model process error: {0}")]
    ModelProcess(String),

    /// The stream was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether retrying the request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { retryable, .. } => *retryable,
            Self::Network(_) => true,
            Self::AuthenticationFailed(_)
            | Self::Provider(_)
            | Self::Parse(_)
            | Self::InactivityTimeout(_)
            | Self::ModelProcess(_)
            | Self::Cancelled => false,
        }
    }

    /// Short classification string for logging and telemetry.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "auth",
            Self::Api { .. } => "api",
            Self::Provider(_) => "provider",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::InactivityTimeout(_) => "timeout",
            Self::ModelProcess(_) => "model_process",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into the appropriate variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            429 => Self::Api {
                status,
                message: body,
                retryable: true,
            },
            500..=599 => Self::Api {
                status,
                message: body,
                retryable: true,
            },
            _ => Self::Api {
                status,
                message: body,
                retryable: false,
            },
        }
    }
}

impl From<&TransportError> for RunErrorInfo {
    fn from(e: &TransportError) -> Self {
        Self {
            category: e.category().to_string(),
            message: e.to_string(),
        }
    }
}

/// Core streaming transport trait.
///
/// Implementors must be `Send + Sync` for use across async tasks. The
/// returned stream pushes zero or more [`TransportEvent::Delta`]s and then
/// exactly one terminal item: `Ok(TransportEvent::Done)` or `Err(_)`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport identifier (`"remote"`, `"local"`), for logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether events arrive incrementally. Both shipped transports
    /// stream; the flag is part of the contract with the editor surface.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Check construction-time configuration (credentials, proxy URL).
    ///
    /// Called by the run registry before any run is created so that a
    /// misconfigured transport fails synchronously instead of producing a
    /// run that can only error.
    fn validate_config(&self) -> Result<(), String> {
        Ok(())
    }

    /// Send an assembled request and return the event stream.
    ///
    /// Returns immediately once the request is underway; all I/O happens
    /// as the stream is polled.
    async fn stream(&self, request: &TransportRequest) -> TransportResult<TransportEventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Network("tcp reset".into()).is_retryable());
        assert!(
            TransportError::Api {
                status: 503,
                message: "overloaded".into(),
                retryable: true,
            }
            .is_retryable()
        );
        assert!(!TransportError::AuthenticationFailed("bad key".into()).is_retryable());
        assert!(!TransportError::Cancelled.is_retryable());
        assert!(!TransportError::InactivityTimeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            TransportError::from_status(401, "no".into()),
            TransportError::AuthenticationFailed(_)
        ));
        assert!(TransportError::from_status(429, "slow down".into()).is_retryable());
        assert!(TransportError::from_status(502, "bad gateway".into()).is_retryable());
        assert!(!TransportError::from_status(400, "bad request".into()).is_retryable());
    }

    #[test]
    fn category_strings() {
        assert_eq!(TransportError::Cancelled.category(), "cancelled");
        assert_eq!(
            TransportError::InactivityTimeout(Duration::from_secs(1)).category(),
            "timeout"
        );
        assert_eq!(TransportError::ModelProcess("gone".into()).category(), "model_process");
    }

    #[test]
    fn error_info_conversion_is_content_free() {
        let err = TransportError::Network("connection refused".into());
        let info = RunErrorInfo::from(&err);
        assert_eq!(info.category, "network");
        assert!(info.message.contains("connection refused"));
    }

    #[test]
    fn transport_is_object_safe() {
        fn assert_object_safe(_: &dyn Transport) {}
        let _ = assert_object_safe;
    }

    #[test]
    fn request_serde_skips_absent_model() {
        let request = TransportRequest {
            run_id: RunId::from_raw("run_x"),
            system_prompt: "s".into(),
            user_content: "u".into(),
            prefix_hash: "abc123".into(),
            model: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["prefixHash"], "abc123");
    }
}
