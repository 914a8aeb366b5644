//! Prompt construction errors.
//!
//! Everything here belongs to the synchronous invalid-argument class: these
//! errors are returned to the caller before a run exists, never delivered
//! as stream events.

/// Errors from template rendering or context validation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    /// The skill defines no prompt template.
    #[error("skill defines no prompt template")]
    TemplateMissing,

    /// A template rendered to an empty string after substitution.
    ///
    /// Guards against silently sending a blank prompt when every variable
    /// a template references is unset.
    #[error("{which} prompt rendered empty")]
    EmptyRender {
        /// Which template came up empty (`"system"` or `"user"`).
        which: &'static str,
    },

    /// A context ref is not a valid project-relative path.
    #[error("invalid context ref `{path}`: {reason}")]
    InvalidRef {
        /// The offending path, as supplied (post-trim).
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}
