//! Skill store seam.
//!
//! The skill catalog itself (authoring, storage, sync) lives outside this
//! engine; the registry only needs to resolve an id to its templates.

use std::collections::HashMap;

use quill_prompt::SkillDefinition;

/// Reserved skill id used for inline tab completion runs.
pub const COMPLETION_SKILL_ID: &str = "inline-completion";

/// Built-in templates for the reserved inline-completion skill.
///
/// Applications must register this under [`COMPLETION_SKILL_ID`] in the
/// skill store handed to the registry; completion requests are ordinary
/// runs and resolve their templates the same way skill runs do.
pub fn completion_skill_definition() -> SkillDefinition {
    SkillDefinition {
        system_template: Some(
            "You are an inline writing assistant. Continue the user's text naturally, \
             matching its tone and style. Reply with only the continuation, no preamble."
                .into(),
        ),
        user_template: Some("{{text}}".into()),
    }
}

/// Resolves skill ids to their prompt templates.
pub trait SkillStore: Send + Sync {
    /// Look up a skill definition. `None` means the id is unknown.
    fn get_skill_definition(&self, skill_id: &str) -> Option<SkillDefinition>;
}

/// In-memory skill store, for tests and fixed built-in skill sets.
#[derive(Default)]
pub struct StaticSkillStore {
    skills: HashMap<String, SkillDefinition>,
}

impl StaticSkillStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, skill_id: impl Into<String>, definition: SkillDefinition) -> Self {
        let _ = self.skills.insert(skill_id.into(), definition);
        self
    }
}

impl SkillStore for StaticSkillStore {
    fn get_skill_definition(&self, skill_id: &str) -> Option<SkillDefinition> {
        self.skills.get(skill_id).cloned()
    }
}
