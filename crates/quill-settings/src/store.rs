//! Settings persistence and change broadcast.
//!
//! One JSON record on disk, loaded once at startup. Updates are deep-merge
//! patches: the merged record is re-validated as a whole, written with a
//! temp-file + rename so readers never see a torn file, then broadcast to
//! watch subscribers. Readers always hold a complete validated snapshot
//! behind an `Arc`; a reload swaps the value without disturbing snapshots
//! already taken.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use crate::errors::{Result, SettingsError};
use crate::types::Settings;

/// Owns the persisted settings record and its subscriber channel.
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<Arc<Settings>>,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults when the file
    /// is missing or unreadable (a corrupt record is logged, not fatal).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_record(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load settings, using defaults");
                Settings::default()
            }
        };
        let (tx, _rx) = watch::channel(Arc::new(settings));
        Self { path, tx }
    }

    /// Current settings snapshot.
    pub fn get(&self) -> Arc<Settings> {
        self.tx.borrow().clone()
    }

    /// Subscribe to settings changes.
    ///
    /// The receiver immediately holds the current value; each successful
    /// [`update`](Self::update) marks it changed.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }

    /// Apply a deep-merge patch to the current record.
    ///
    /// Validates the merged record before persisting; on any failure the
    /// stored record and subscribers are untouched. On success the new
    /// record is written to disk first, then broadcast.
    pub fn update(&self, patch: Value) -> Result<Arc<Settings>> {
        let current = serde_json::to_value(self.get().as_ref())?;
        let merged = deep_merge(current, patch);
        let settings: Settings = serde_json::from_value(merged)?;
        settings.validate()?;

        write_record(&self.path, &settings)?;

        let snapshot = Arc::new(settings);
        let _ = self.tx.send_replace(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

/// Recursively merge `overlay` onto `base`. Objects merge key-by-key;
/// every other value type is replaced by the overlay.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn read_record(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Write the record atomically: temp file in the same directory, rename.
fn write_record(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(settings)?)?;
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })?;
    Ok(())
}
