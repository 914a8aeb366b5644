//! Settings error types.

/// Result type alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors from loading, validating, or persisting settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A proposed settings value violates an invariant.
    ///
    /// Returned before anything is persisted; the stored record is
    /// unchanged when this surfaces.
    #[error("invalid settings: {field}: {reason}")]
    Invalid {
        /// JSON field name, as it appears in the persisted record.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// Reading or writing the settings file failed.
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings record (or a patch) is not valid JSON for the schema.
    #[error("settings parse error: {0}")]
    Json(#[from] serde_json::Error),
}
