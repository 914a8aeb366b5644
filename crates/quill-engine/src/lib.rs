//! # quill-engine
//!
//! The run lifecycle manager. [`RunRegistry`] owns every in-flight AI
//! generation: it validates requests (template render → context
//! normalization → prompt hashing → transport preflight), allocates run
//! ids, relays transport events to subscribers in arrival order, and
//! routes idempotent cancellation.
//!
//! Failure split: validation problems come back synchronously from
//! `start()` and never create a run; transport problems surface as the
//! run's terminal error event and never escape the registry.
//!
//! Runs are ephemeral — nothing here is persisted, by design.
//!
//! ## Crate Position
//!
//! Depends on: quill-core, quill-prompt, quill-llm.
//! Depended on by: quill-localmodel, quill-completion.

#![deny(unsafe_code)]

pub mod error;
pub mod registry;
pub mod run;
pub mod skills;

pub use error::RunError;
pub use registry::{RunRegistry, StartRequest, StartedRun};
pub use run::{Run, RunPrompt, RunState};
pub use skills::{COMPLETION_SKILL_ID, SkillStore, StaticSkillStore, completion_skill_definition};
