//! Pulls JSON payloads out of free-form model replies (prose, code fences, truncation).

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::LlmError;

/// End index (exclusive) of the balanced value opening at `start`, honouring strings.
fn balanced_end(text: &str, start: usize, open: u8, close: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn first_balanced(text: &str, open: u8, close: u8) -> Option<JsonValue> {
    text.bytes()
        .enumerate()
        .filter(|(_, b)| *b == open)
        .find_map(|(start, _)| {
            let end = balanced_end(text, start, open, close)?;
            serde_json::from_str::<JsonValue>(&text[start..end]).ok()
        })
}

/// First parseable `{...}` in `text`.
pub fn extract_json_object(text: &str) -> Option<JsonValue> {
    first_balanced(text, b'{', b'}').filter(JsonValue::is_object)
}

/// First parseable `[...]` in `text`.
pub fn extract_json_array(text: &str) -> Option<Vec<JsonValue>> {
    match first_balanced(text, b'[', b']')? {
        JsonValue::Array(items) => Some(items),
        _ => None,
    }
}

/// Like [`extract_json_array`], but salvages a truncated reply by cutting after the last
/// complete object and closing the array.
pub fn extract_json_array_lenient(text: &str) -> Option<Vec<JsonValue>> {
    if let Some(items) = extract_json_array(text) {
        return Some(items);
    }
    let start = text.find('[')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let repaired = format!("{}]", &text[start..=end]);
    match serde_json::from_str::<JsonValue>(&repaired).ok()? {
        JsonValue::Array(items) => Some(items),
        _ => None,
    }
}

pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let value = extract_json_object(text)
        .ok_or_else(|| LlmError::Parse("no JSON object in response".to_string()))?;
    serde_json::from_value(value).map_err(|e| LlmError::Parse(e.to_string()))
}

pub fn parse_json_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, LlmError> {
    let items = extract_json_array(text)
        .ok_or_else(|| LlmError::Parse("no JSON array in response".to_string()))?;
    serde_json::from_value(JsonValue::Array(items)).map_err(|e| LlmError::Parse(e.to_string()))
}

/// Element-wise decode of a lenient array; elements that don't fit `T` are dropped.
pub fn parse_json_array_lenient<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, LlmError> {
    let items = extract_json_array_lenient(text)
        .ok_or_else(|| LlmError::Parse("no JSON array in response".to_string()))?;
    let total = items.len();
    let parsed: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if parsed.len() < total {
        tracing::debug!(total, kept = parsed.len(), "dropped malformed array elements");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn object_inside_prose_and_fences() {
        let reply = "Sure! Here you go:\n```json\n{\"category\": \"video-ai\", \"note\": \"uses {braces} and \\\"quotes\\\"\"}\n```\nAnything else?";
        assert_eq!(
            extract_json_object(reply),
            Some(json!({"category": "video-ai", "note": "uses {braces} and \"quotes\""}))
        );
    }

    #[test]
    fn skips_unparseable_candidates() {
        let reply = "options {a, b} then {\"ok\": true}";
        assert_eq!(extract_json_object(reply), Some(json!({"ok": true})));
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn array_with_bracket_in_leading_prose() {
        let reply = "Found [three] platforms: [{\"name\": \"A\"}, {\"name\": \"B]\"}]";
        let items = extract_json_array(reply).expect("array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["name"], "B]");
    }

    #[test]
    fn lenient_array_salvages_truncated_reply() {
        let reply = "[{\"name\": \"A\", \"url\": \"https://a.ai\"}, {\"name\": \"B\", \"url\": \"https://b.ai\"}, {\"name\": \"C\", \"ur";
        assert_eq!(extract_json_array(reply), None);
        let items = extract_json_array_lenient(reply).expect("salvaged");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["name"], "B");
    }

    #[test]
    fn typed_parsing() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Item {
            name: String,
        }

        let items: Vec<Item> = parse_json_array_lenient("[{\"name\": \"A\"}, {\"title\": 1}]").expect("parse");
        assert_eq!(items, vec![Item { name: "A".into() }]);

        let err = parse_json_object::<Item>("nothing").expect_err("no object");
        assert!(matches!(err, LlmError::Parse(_)));
        assert!(parse_json_array::<Item>("[{\"title\": 1}]").is_err());
    }
}
