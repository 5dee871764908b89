//! Extracting the requested action from a model reply.
//!
//! The agent protocol asks the model for exactly one JSON object with an
//! `"action"` key, wrapped in ```json fences. Models drift from that, so
//! extraction tries progressively looser strategies: the requested fence,
//! any fence, a brace-counting scan over the raw text, and finally a retry
//! after fixing common cosmetic JSON mistakes.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static JSON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n\s*```").expect("json fence regex"));
static ANY_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*\n(.*?)\n\s*```").expect("fence regex"));
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma regex"));

/// Extract one JSON action object (an object with an `"action"` key) from a
/// model reply. Returns `None` when no parsable action is present.
pub fn parse_action(text: &str) -> Option<Value> {
    extract_object(text, |v| v.get("action").is_some())
}

/// Extract any JSON object from a model reply, using the same strategies as
/// `parse_action` without requiring an `"action"` key.
pub fn parse_json_object(text: &str) -> Option<Value> {
    extract_object(text, |_| true)
}

fn extract_object(text: &str, accept: impl Fn(&Value) -> bool) -> Option<Value> {
    // 1. ```json fenced block (the explicitly requested format)
    if let Some(caps) = JSON_FENCE_RE.captures(text)
        && let Some(value) = try_parse(caps.get(1).map_or("", |m| m.as_str()), &accept)
    {
        return Some(value);
    }

    // 2. Any fenced code block
    if let Some(caps) = ANY_FENCE_RE.captures(text)
        && let Some(value) = try_parse(caps.get(1).map_or("", |m| m.as_str()), &accept)
    {
        return Some(value);
    }

    // 3. Brace-counting scan over the raw text
    for candidate in extract_json_objects(text) {
        if let Some(value) = try_parse(candidate, &accept) {
            return Some(value);
        }
    }

    // 4. Fix common cosmetic issues (single quotes, trailing commas), retry
    let quoted = text.replace('\'', "\"");
    let fixed = TRAILING_COMMA_RE.replace_all(&quoted, "$1");
    for candidate in extract_json_objects(&fixed) {
        if let Some(value) = try_parse(candidate, &accept) {
            return Some(value);
        }
    }

    None
}

fn try_parse(candidate: &str, accept: &impl Fn(&Value) -> bool) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value) if value.is_object() && accept(&value) => Some(value),
        _ => None,
    }
}

/// Top-level `{...}` spans in the text, found by brace counting that is
/// aware of strings and escapes.
fn extract_json_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if !in_string => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0
                        && let Some(s) = start.take()
                    {
                        objects.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    objects
}

/// Remove ```json fenced blocks from a reply, leaving the reasoning text
/// for display.
pub fn strip_action_blocks(text: &str) -> String {
    JSON_FENCE_RE.replace_all(text, "").trim().to_string()
}
