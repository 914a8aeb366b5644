//! Injected-context validation and normalization.
//!
//! Refs must stay inside the project root. The rule is purely lexical:
//! no filesystem access, no symlink resolution, no case folding — the
//! same input always validates and hashes the same way, which keeps
//! prompt-hash comparisons reproducible across machines and restarts.
//! A path is invalid if it is rooted (`/`, `\`), carries a drive letter
//! (`C:`), or contains a `..` component under either separator.

use crate::error::PromptError;
use crate::types::InjectedContext;

/// Validate refs and return the normalized context.
///
/// Any single invalid ref fails the whole request, naming the offending
/// path; silently dropping entries would make hash comparisons
/// non-reproducible. `memory` passes through untouched (rank order is
/// caller-significant), as do the context rules.
pub fn validate_and_normalize(context: &InjectedContext) -> Result<InjectedContext, PromptError> {
    let mut refs = Vec::with_capacity(context.refs.len());
    for entry in &context.refs {
        let trimmed = entry.trim();
        if let Some(reason) = rejection_reason(trimmed) {
            return Err(PromptError::InvalidRef {
                path: trimmed.to_string(),
                reason,
            });
        }
        refs.push(trimmed.to_string());
    }

    refs.sort();
    refs.dedup();

    Ok(InjectedContext {
        memory: context.memory.clone(),
        refs,
        context_rules: context.context_rules.clone(),
    })
}

/// Why a trimmed ref is not a valid project-relative path, if it isn't.
fn rejection_reason(path: &str) -> Option<&'static str> {
    if path.is_empty() {
        return Some("empty path");
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Some("absolute path");
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Some("drive-letter path");
    }
    if path.split(['/', '\\']).any(|component| component == "..") {
        return Some("escapes the project root");
    }
    None
}
