//! # quill-llm
//!
//! Streaming transport abstraction for AI generation backends.
//!
//! The [`Transport`] trait is the seam between the run registry and
//! whatever produces tokens: accept a fully assembled request, return a
//! handle (stream) immediately, push zero or more ordered deltas, then
//! exactly one terminal item.
//!
//! ## Module Overview
//!
//! - [`transport`] — the trait, event, request, and error vocabulary
//! - [`remote`] — network provider over SSE with inactivity timeout
//! - [`local`] — localhost model process over newline-delimited JSON
//! - [`mock`] — scripted transport for tests
//!
//! ## Crate Position
//!
//! Depends on: quill-core.
//! Depended on by: quill-engine, quill-localmodel, quill-completion.

#![deny(unsafe_code)]

pub mod local;
pub mod mock;
pub mod remote;
pub mod transport;

pub use local::{DEFAULT_LOCAL_BASE_URL, LocalTransport};
pub use mock::{MockResponse, MockStep, MockTransport};
pub use remote::{DEFAULT_BASE_URL, DEFAULT_INACTIVITY_TIMEOUT, RemoteConfig, RemoteTransport};
pub use transport::{
    Transport, TransportError, TransportEvent, TransportEventStream, TransportRequest,
    TransportResult,
};
