//! Run registry errors.

use quill_core::RunId;
use quill_prompt::PromptError;

/// Errors returned synchronously from registry operations.
///
/// Every variant except [`UnknownRun`](RunError::UnknownRun) belongs to the
/// invalid-argument class: returned from `start()` before a run exists,
/// with registry state unchanged. Transport failures never appear here —
/// they surface as the run's terminal error event.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The skill store has no definition for this id.
    #[error("skill not found: {skill_id}")]
    SkillNotFound {
        /// The id that failed to resolve.
        skill_id: String,
    },

    /// Template rendering or context validation failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The selected transport is not usable as configured
    /// (missing credentials, empty proxy base URL).
    #[error("transport configuration: {0}")]
    Config(String),

    /// Subscription target does not exist (never created, or already
    /// terminal and evicted).
    #[error("unknown run: {0}")]
    UnknownRun(RunId),
}

impl RunError {
    /// Whether this is a validation failure of the caller's request.
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(self, Self::UnknownRun(_))
    }
}
