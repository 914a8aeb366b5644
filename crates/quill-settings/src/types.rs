//! Settings record types.

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Current schema version written to disk.
pub const SETTINGS_VERSION: u32 = 1;

/// Proxy routing for the remote provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxySettings {
    /// Whether requests are routed through the proxy.
    pub enabled: bool,
    /// Proxy base URL. Must be non-empty while `enabled` is true.
    pub base_url: String,
}

/// The single persisted settings record for the AI engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Schema version of the record.
    pub version: u32,
    /// Master switch for local inline completion.
    pub enabled: bool,
    /// Id of the model selected for completion, when one is chosen.
    pub model_selection: Option<String>,
    /// Remote proxy configuration.
    pub proxy: ProxySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            enabled: false,
            model_selection: None,
            proxy: ProxySettings::default(),
        }
    }
}

impl Settings {
    /// Check record invariants.
    ///
    /// Called on every proposed update before anything is persisted.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.proxy.enabled && self.proxy.base_url.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "baseUrl",
                reason: "proxy enabled requires a non-empty base URL",
            });
        }
        if self
            .model_selection
            .as_ref()
            .is_some_and(|m| m.trim().is_empty())
        {
            return Err(SettingsError::Invalid {
                field: "modelSelection",
                reason: "model selection must name a model or be absent",
            });
        }
        Ok(())
    }
}
