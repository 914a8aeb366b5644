//! # quill-core
//!
//! Shared foundation for the Quill AI run engine: branded identifiers,
//! the run event vocabulary, and the dependency-injected telemetry seam.
//!
//! ## Crate Position
//!
//! Standalone (no quill crate dependencies).
//! Depended on by: quill-prompt, quill-llm, quill-engine, quill-localmodel,
//! quill-completion.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod telemetry;

pub use events::{RunErrorInfo, RunEvent, RunOutput};
pub use ids::RunId;
pub use telemetry::{
    CollectingSink, MetricsSink, NoopSink, RecordedEvent, RunOutcome, TelemetrySink,
};
