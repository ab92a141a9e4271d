//! Tolerant extraction of JSON payloads from LLM output.
//!
//! Models wrap JSON in markdown fences, prepend chatter, or nest the array under
//! a `messages` / `personas` key. Everything that is not recoverable becomes a
//! [`FoundryError::MalformedResponse`] carrying a snippet of the raw text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{FoundryError, Result};
use crate::models::{GeneratedMessage, GeneratedPersona};

fn code_fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").ok())
        .as_ref()
}

fn json_span() -> Option<&'static Regex> {
    static SPAN: OnceLock<Option<Regex>> = OnceLock::new();
    SPAN.get_or_init(|| Regex::new(r"(\[[\s\S]*\]|\{[\s\S]*\})").ok())
        .as_ref()
}

/// Pull the first JSON document out of free-form model output.
pub fn extract_json(raw: &str) -> Result<Value> {
    let mut text = raw.trim();

    if let Some(inner) = code_fence().and_then(|re| re.captures(text)).and_then(|c| c.get(1)) {
        text = inner.as_str().trim();
    }
    if let Some(span) = json_span().and_then(|re| re.find(text)) {
        text = span.as_str();
    }

    serde_json::from_str(text).map_err(|e| FoundryError::malformed(format!("invalid JSON: {e}"), raw))
}

fn unwrap_key(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

/// Parse a message batch: a bare array or `{"messages": [...]}`.
pub fn parse_messages(raw: &str) -> Result<Vec<GeneratedMessage>> {
    let value = unwrap_key(extract_json(raw)?, "messages");
    if !value.is_array() {
        return Err(FoundryError::malformed("expected a JSON array of messages", raw));
    }
    serde_json::from_value(value).map_err(|e| FoundryError::malformed(format!("invalid message object: {e}"), raw))
}

/// Parse persona drafts: an array, `{"personas": [...]}`, or a single object.
pub fn parse_personas(raw: &str) -> Result<Vec<GeneratedPersona>> {
    let value = match unwrap_key(extract_json(raw)?, "personas") {
        object @ Value::Object(_) => Value::Array(vec![object]),
        other => other,
    };
    if !value.is_array() {
        return Err(FoundryError::malformed("expected a JSON array of personas", raw));
    }
    serde_json::from_value(value).map_err(|e| FoundryError::malformed(format!("invalid persona object: {e}"), raw))
}
