//! Dependency inference between tool calls.
//!
//! A new call depends on a prior one when the prior call's id — or its
//! 1-based positional alias `#N` — appears as a substring of the new call's
//! serialized input. This is a textual heuristic, not a semantic reference
//! check: false negatives (a real data dependency not textually visible)
//! and false positives (coincidental substring collisions) are both
//! accepted. Callers that know their dependencies should declare them
//! explicitly via [`ToolPipeline::add_call_with_deps`] and leave this as a
//! fallback.
//!
//! [`ToolPipeline::add_call_with_deps`]: crate::pipeline::ToolPipeline::add_call_with_deps

use std::collections::BTreeSet;

/// Infer which of the already-registered calls the given input references.
///
/// `prior` is `(id, registration_position)`, position 0-based; the alias
/// exposed to the model is 1-based (`#1` is the first registered call).
pub fn infer_dependencies(
    input: &serde_json::Value,
    prior: &[(String, usize)],
) -> BTreeSet<String> {
    let serialized = input.to_string();

    prior
        .iter()
        .filter(|(id, position)| {
            serialized.contains(id.as_str()) || contains_alias(&serialized, position + 1)
        })
        .map(|(id, _)| id.clone())
        .collect()
}

/// Match `#N` without treating `#12` as a reference to `#1`.
fn contains_alias(text: &str, n: usize) -> bool {
    let alias = format!("#{n}");
    let mut search = text;
    while let Some(at) = search.find(&alias) {
        let rest = &search[at + alias.len()..];
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            return true;
        }
        search = rest;
    }
    false
}
