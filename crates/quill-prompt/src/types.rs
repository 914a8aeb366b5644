//! Input and output types for prompt construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A skill's prompt templates, as returned by the skill store.
///
/// Both templates use the same variable namespace: `{{name}}` placeholders
/// and `{{#name}}...{{/name}}` conditional sections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDefinition {
    /// System prompt template. `None` when the skill defines no template.
    pub system_template: Option<String>,
    /// User prompt template. `None` when the skill defines no template.
    pub user_template: Option<String>,
}

/// Named string variables bound into a skill's templates.
///
/// A `BTreeMap` keeps iteration deterministic, which matters for log
/// output and test stability; render results never depend on order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillPromptInput(BTreeMap<String, String>);

impl SkillPromptInput {
    /// Create an empty variable bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.0.insert(name.into(), value.into());
        self
    }

    /// Look up a variable's value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Whether a variable is absent or blank (empty after trimming).
    ///
    /// Blank variables behave like absent ones for conditional sections.
    pub fn is_blank(&self, name: &str) -> bool {
        self.get(name).is_none_or(|v| v.trim().is_empty())
    }
}

/// Windowing knobs supplied by the editor surface.
///
/// Opaque to this crate: the collaborator that performs context windowing
/// interprets it. Its byte encoding participates in both prompt hashes, so
/// two requests differing only in rules hash differently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRules {
    /// Characters of document text to include before the caret.
    pub before_chars: u32,
    /// Characters of document text to include after the caret.
    pub after_chars: u32,
    /// Whether the document outline is included alongside the excerpt.
    pub include_outline: bool,
}

/// Auxiliary context attached to a run alongside the literal prompt input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedContext {
    /// Memory snippets in rank order. Ordering is caller-significant and
    /// preserved verbatim; this is a ranking, not a set.
    pub memory: Vec<String>,
    /// Project-relative file references. Normalized (trimmed, deduplicated,
    /// codepoint-sorted) by [`crate::validate_and_normalize`].
    pub refs: Vec<String>,
    /// Opaque windowing rules, forwarded without interpretation.
    pub context_rules: ContextRules,
}

/// Result of rendering a skill's templates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledPrompt {
    /// Rendered, trimmed system prompt. Never empty.
    pub system_prompt: String,
    /// Rendered, trimmed user content. Never empty.
    pub user_content: String,
}
