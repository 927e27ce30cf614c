//! Checks on raw model output: structural validity, refusal detection, schema coverage.

use serde_json::{Map, Value};

use crate::extraction::models::{RoleKind, TokenUsage};
use crate::extraction::prompts::REFUSAL_PHRASE;

/// Completion length of the refusal phrase under the provider's tokenizer.
/// Only a fallback signal: it breaks whenever the tokenizer or phrase changes.
pub const REFUSAL_COMPLETION_TOKENS: u32 = 8;

/// True when `text` parses as a JSON document.
pub fn is_well_formed(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Parses `text` into a field mapping. Non-object documents yield `None`.
pub fn parse_fields(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Whether the model answered with the refusal phrase instead of an extraction.
pub fn is_refusal(text: &str, usage: &TokenUsage) -> bool {
    matches_refusal_text(text) || usage.completion_tokens == REFUSAL_COMPLETION_TOKENS
}

fn matches_refusal_text(text: &str) -> bool {
    let cleaned = text
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_end_matches('.')
        .trim();
    cleaned.eq_ignore_ascii_case(REFUSAL_PHRASE)
}

/// Schema keys for `role` that the model left out.
pub fn missing_keys(role: RoleKind, fields: &Map<String, Value>) -> Vec<&'static str> {
    role.schema_keys()
        .into_iter()
        .filter(|key| !fields.contains_key(*key))
        .collect()
}
