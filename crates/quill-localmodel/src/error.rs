//! Local model errors.

use quill_engine::RunError;

/// Result type alias for local model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors from model lifecycle management and the completion entry point.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The id is not in the model catalog.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The model is mid-download; the operation cannot proceed.
    #[error("model {0} is currently downloading")]
    Busy(String),

    /// Fetching an artifact failed (network, disk full, registry error).
    #[error("download failed: {0}")]
    Download(String),

    /// A downloaded artifact's digest does not match the catalog.
    ///
    /// The staged artifact is discarded; the model is never marked ready
    /// from a corrupt download.
    #[error("integrity check failed for {file}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Artifact file name.
        file: String,
        /// Digest the catalog expects.
        expected: String,
        /// Digest actually computed.
        actual: String,
    },

    /// Filesystem operation failed.
    #[error("model storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Inline completion is switched off in settings.
    #[error("inline completion is disabled in settings")]
    Disabled,

    /// No model is selected for completion.
    #[error("no active completion model")]
    NoActiveModel,

    /// The selected model is not in the `Ready` state.
    #[error("model {0} is not ready")]
    NotReady(String),

    /// Starting the completion run failed validation.
    #[error(transparent)]
    Run(#[from] RunError),
}

impl ModelError {
    /// Whether this is an invalid-argument-class failure of the caller's
    /// request (as opposed to a download/storage problem).
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            Self::UnknownModel(_) | Self::Disabled | Self::NoActiveModel | Self::NotReady(_) => {
                true
            }
            Self::Run(e) => e.is_invalid_argument(),
            Self::Busy(_)
            | Self::Download(_)
            | Self::IntegrityMismatch { .. }
            | Self::Io(_) => false,
        }
    }
}
