//! # quill-settings
//!
//! Persisted user configuration for the AI engine: one versioned JSON
//! record, loaded once at startup and mutated only through validated
//! deep-merge patches. Successful updates are persisted atomically and
//! broadcast over a watch channel so open completion surfaces adopt the
//! change without a restart.
//!
//! ## Crate Position
//!
//! Standalone (no quill crate dependencies).
//! Depended on by: quill-localmodel.

#![deny(unsafe_code)]

pub mod errors;
pub mod store;
pub mod types;

pub use errors::{Result, SettingsError};
pub use store::{SettingsStore, deep_merge};
pub use types::{ProxySettings, SETTINGS_VERSION, Settings};
