//! # quill-prompt
//!
//! Deterministic prompt construction for AI runs: skill template rendering,
//! injected-context validation/normalization, and stable prompt hashing.
//!
//! The three stages are pure functions applied in order before a run is
//! allowed to start:
//!
//! 1. [`assembler`] — render a skill's system/user templates against named
//!    variables (`{{name}}` placeholders, `{{#name}}...{{/name}}` sections)
//! 2. [`context`] — validate file refs against the project root and
//!    normalize them (trim → dedup → sort)
//! 3. [`hasher`] — compute the stable-prefix and full prompt hashes over a
//!    canonical byte encoding
//!
//! Nothing here performs I/O; any validation failure aborts the request
//! before a transport is contacted.
//!
//! ## Crate Position
//!
//! Standalone (no quill crate dependencies).
//! Depended on by: quill-engine, quill-localmodel, quill-completion.

#![deny(unsafe_code)]

pub mod assembler;
pub mod context;
pub mod error;
pub mod hasher;
pub mod types;

pub use assembler::assemble;
pub use context::validate_and_normalize;
pub use error::PromptError;
pub use hasher::{PromptHashes, hash_prompt};
pub use types::{AssembledPrompt, ContextRules, InjectedContext, SkillDefinition, SkillPromptInput};
