//! Skill template rendering.
//!
//! A two-pass pure transform over the template text: a section-pruning pass
//! removes `{{#name}}...{{/name}}` blocks whose bound variable is absent or
//! blank (markers included) and unwraps the kept ones, then a substitution
//! pass replaces remaining `{{name}}` placeholders. No shared mutable
//! state; each pass is a plain string function.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::PromptError;
use crate::types::{AssembledPrompt, SkillDefinition, SkillPromptInput};

static SECTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([#/])([A-Za-z][A-Za-z0-9_-]*)\}\}").unwrap());

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z][A-Za-z0-9_-]*)\}\}").unwrap());

/// Render a skill's templates against the supplied variables.
///
/// Fails with [`PromptError::TemplateMissing`] when the skill defines no
/// template, and [`PromptError::EmptyRender`] when either rendered string
/// is empty after substitution and trimming.
pub fn assemble(
    definition: &SkillDefinition,
    input: &SkillPromptInput,
) -> Result<AssembledPrompt, PromptError> {
    let system_template = definition
        .system_template
        .as_deref()
        .ok_or(PromptError::TemplateMissing)?;
    let user_template = definition
        .user_template
        .as_deref()
        .ok_or(PromptError::TemplateMissing)?;

    let system_prompt = render_template(system_template, input);
    if system_prompt.is_empty() {
        return Err(PromptError::EmptyRender { which: "system" });
    }

    let user_content = render_template(user_template, input);
    if user_content.is_empty() {
        return Err(PromptError::EmptyRender { which: "user" });
    }

    Ok(AssembledPrompt {
        system_prompt,
        user_content,
    })
}

/// Render one template: prune sections, substitute placeholders, trim.
fn render_template(template: &str, vars: &SkillPromptInput) -> String {
    let pruned = prune_sections(template, vars);
    let substituted = substitute_placeholders(&pruned, vars);
    substituted.trim().to_string()
}

/// One open conditional section during the pruning scan.
struct Frame {
    name: String,
    open_marker: String,
    body: String,
}

/// Remove conditional sections whose variable is absent or blank.
///
/// Stack-based single pass so differently-named sections nest correctly.
/// Unmatched open or close markers are kept as literal text; a malformed
/// skill degrades visibly instead of blocking rendering.
fn prune_sections(template: &str, vars: &SkillPromptInput) -> String {
    let mut root = String::with_capacity(template.len());
    let mut stack: Vec<Frame> = Vec::new();
    let mut cursor = 0;

    fn emit(root: &mut String, stack: &mut [Frame], text: &str) {
        match stack.last_mut() {
            Some(frame) => frame.body.push_str(text),
            None => root.push_str(text),
        }
    }

    for caps in SECTION_MARKER.captures_iter(template) {
        let marker = caps.get(0).unwrap();
        let kind = &caps[1];
        let name = &caps[2];

        emit(&mut root, &mut stack, &template[cursor..marker.start()]);
        cursor = marker.end();

        if kind == "#" {
            stack.push(Frame {
                name: name.to_string(),
                open_marker: marker.as_str().to_string(),
                body: String::new(),
            });
        } else if stack.last().is_some_and(|frame| frame.name == name) {
            if let Some(frame) = stack.pop() {
                if !vars.is_blank(&frame.name) {
                    emit(&mut root, &mut stack, &frame.body);
                }
            }
        } else {
            // Close marker with no matching open: literal text.
            emit(&mut root, &mut stack, marker.as_str());
        }
    }

    emit(&mut root, &mut stack, &template[cursor..]);

    // Unclosed opens: the marker and body become literal text.
    while let Some(frame) = stack.pop() {
        let mut literal = frame.open_marker;
        literal.push_str(&frame.body);
        emit(&mut root, &mut stack, &literal);
    }

    root
}

/// Replace `{{name}}` placeholders with variable values, empty when unset.
fn substitute_placeholders(template: &str, vars: &SkillPromptInput) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1]).unwrap_or("").to_string()
        })
        .into_owned()
}
