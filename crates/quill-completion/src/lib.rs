//! # quill-completion
//!
//! Client-side debounce and race logic for inline tab completion: raw
//! keystrokes in, at most one in-flight completion run, ghost-text overlay
//! updates out. Stale results are cancelled before they can be displayed;
//! failures never interrupt the typing flow.
//!
//! ## Crate Position
//!
//! Depends on: quill-core, quill-prompt, quill-localmodel.
//! Consumed by the editor surface.

#![deny(unsafe_code)]

pub mod backend;
pub mod controller;

pub use backend::{CompletionBackend, CompletionRun};
pub use controller::{
    CaretContext, CompletionConfig, DEFAULT_DEBOUNCE, OverlayUpdate, TabCompletionController,
};
