//! Events delivered to run subscribers. Strict ordering contract:
//!
//! Delta* → (Done | Error | Cancelled)
//!
//! Terminal events are final: nothing is delivered for a run after one,
//! including transport events that were already buffered when the run was
//! cancelled.

use serde::{Deserialize, Serialize};

/// Final payload of a successful run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    /// Full generated text (concatenation of all deltas).
    pub text: String,
    /// Model that produced the output, when the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl RunOutput {
    /// Convenience constructor for a plain text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }
}

/// Lightweight error description carried on terminal error events.
///
/// Keeps subscriber channels `Clone`-able without dragging full transport
/// error ownership (connection handles, source chains) across the fan-out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunErrorInfo {
    /// Short classification string (`"network"`, `"api"`, `"timeout"`, ...).
    pub category: String,
    /// Human-readable description. Never contains prompt content.
    pub message: String,
}

/// Events emitted over a run's subscriber channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEvent {
    /// An ordered, append-only fragment of generated text.
    Delta { text: String },
    /// Successful completion. Terminal.
    Done { output: RunOutput },
    /// Transport-level failure. Terminal.
    Error { error: RunErrorInfo },
    /// Explicit user cancellation. Terminal, and never produced by timeouts.
    Cancelled,
}

impl RunEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. } | Self::Cancelled)
    }

    /// Whether this event carries incremental text.
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::Delta { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(RunEvent::Done { output: RunOutput::text("hi") }.is_terminal());
        assert!(
            RunEvent::Error {
                error: RunErrorInfo {
                    category: "network".into(),
                    message: "boom".into(),
                }
            }
            .is_terminal()
        );
        assert!(RunEvent::Cancelled.is_terminal());

        let delta = RunEvent::Delta { text: "x".into() };
        assert!(!delta.is_terminal());
        assert!(delta.is_delta());
    }

    #[test]
    fn output_serde_roundtrip() {
        let out = RunOutput {
            text: "generated".into(),
            model: Some("qwen2.5-0.5b".into()),
        };
        let json = serde_json::to_string(&out).unwrap();
        let back: RunOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(out, back);
    }

    #[test]
    fn output_omits_absent_model() {
        let json = serde_json::to_value(RunOutput::text("t")).unwrap();
        assert!(json.get("model").is_none());
    }
}
