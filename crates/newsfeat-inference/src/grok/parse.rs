//! Decoding of the model's message content into JSON.

use serde_json::Value;

use newsfeat_core::defaults::RAW_RESPONSE_PREVIEW_CHARS;
use newsfeat_core::{Error, Result};

/// Outcome of decoding message content.
#[derive(Debug)]
pub struct DecodedContent {
    pub value: Value,
    /// The first direct parse failed and the fence-stripped retry succeeded.
    pub recovered_from_fence: bool,
}

/// Parse message content as JSON.
///
/// When the direct parse fails and the content is wrapped in a fenced code
/// block, the first and last lines are dropped and parsing is tried once
/// more. The error carries a bounded prefix of the raw content.
pub fn decode_content(content: &str) -> Result<DecodedContent> {
    let first_err = match serde_json::from_str::<Value>(content) {
        Ok(value) => {
            return Ok(DecodedContent {
                value,
                recovered_from_fence: false,
            })
        }
        Err(e) => e,
    };

    if let Some(inner) = strip_code_fence(content) {
        if let Ok(value) = serde_json::from_str::<Value>(&inner) {
            return Ok(DecodedContent {
                value,
                recovered_from_fence: true,
            });
        }
    }

    Err(Error::Parse(format!(
        "response is not valid JSON: {}\nContent: {}",
        first_err,
        preview(content, RAW_RESPONSE_PREVIEW_CHARS)
    )))
}

/// Remove a surrounding ```` ``` ```` fence by dropping the first and last
/// lines. `None` when the content is not fenced or too short to hold a body.
pub fn strip_code_fence(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    let lines: Vec<&str> = trimmed.split('\n').collect();
    if lines.len() <= 2 {
        return None;
    }
    Some(lines[1..lines.len() - 1].join("\n"))
}

/// First `max_chars` characters of `s`, on a char boundary.
pub fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
