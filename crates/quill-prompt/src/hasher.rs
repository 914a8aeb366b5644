//! Stable prompt hashing.
//!
//! Two SHA-256 digests over a canonical byte encoding of the assembled
//! prompt and normalized context:
//!
//! - the **stable prefix hash** covers `(system_prompt, refs, rules)` —
//!   the portion expected to survive minor edits to the user's freeform
//!   input, used to judge whether provider-side cached work is still valid
//! - the **full prompt hash** additionally covers `user_content` and
//!   identifies the exact request byte-for-byte
//!
//! This is a cache key, not a security boundary; SHA-256 is used because
//! it is already in the dependency tree and trivially collision-resistant
//! for this purpose. Each field is fed as `tag byte || u64-be length ||
//! bytes` so no concatenation of distinct inputs can collide.

use sha2::{Digest, Sha256};

use crate::types::{AssembledPrompt, ContextRules, InjectedContext};

const TAG_SYSTEM: u8 = 0x01;
const TAG_USER: u8 = 0x02;
const TAG_REF: u8 = 0x03;
const TAG_RULES: u8 = 0x04;

/// The two digests computed for every run, lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptHashes {
    /// Hash of `(system_prompt, refs, rules)`.
    pub stable_prefix: String,
    /// Hash of `(system_prompt, user_content, refs, rules)`.
    pub full: String,
}

/// Compute both hashes for an assembled prompt and its normalized context.
///
/// `context.refs` must already be normalized (see
/// [`crate::validate_and_normalize`]); the hash covers them in the order
/// given.
pub fn hash_prompt(prompt: &AssembledPrompt, context: &InjectedContext) -> PromptHashes {
    let rules_bytes = canonical_rules(&context.context_rules);

    let mut stable = Sha256::new();
    feed(&mut stable, TAG_SYSTEM, prompt.system_prompt.as_bytes());
    for entry in &context.refs {
        feed(&mut stable, TAG_REF, entry.as_bytes());
    }
    feed(&mut stable, TAG_RULES, &rules_bytes);

    let mut full = Sha256::new();
    feed(&mut full, TAG_SYSTEM, prompt.system_prompt.as_bytes());
    feed(&mut full, TAG_USER, prompt.user_content.as_bytes());
    for entry in &context.refs {
        feed(&mut full, TAG_REF, entry.as_bytes());
    }
    feed(&mut full, TAG_RULES, &rules_bytes);

    PromptHashes {
        stable_prefix: hex(&stable.finalize()),
        full: hex(&full.finalize()),
    }
}

/// Feed one length-prefixed field into a digest.
fn feed(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
    hasher.update([tag]);
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Canonical byte form of the context rules.
///
/// `serde_json` writes struct fields in declaration order, so the encoding
/// is deterministic across process restarts for identical rule values.
fn canonical_rules(rules: &ContextRules) -> Vec<u8> {
    serde_json::to_vec(rules).unwrap_or_default()
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
