//! Oracle Response Parser
//!
//! Oracle answers are meant to be JSON but routinely arrive wrapped in prose,
//! code fences, or under an arbitrary wrapper key. This module turns raw text
//! into a typed extraction result and never panics or errors past its boundary.

use serde_json::{Map, Value};

/// Shape of a list-bearing oracle response
#[derive(Debug, Clone, PartialEq)]
pub enum OracleExtractionResult {
    /// `[ {...}, {...} ]`
    BareList(Vec<Value>),
    /// `{ "<key>": [ ... ] }`
    WrappedObject { key: &'static str, items: Vec<Value> },
    /// A single item object carrying a `description`
    SingleItem(Map<String, Value>),
    /// Nothing usable
    Unparsable,
}

impl OracleExtractionResult {
    /// Classify raw oracle text
    pub fn from_response(text: &str, wrapper_keys: &[&'static str]) -> Self {
        match extract_json(text) {
            Some(value) => Self::from_value(value, wrapper_keys),
            None => Self::Unparsable,
        }
    }

    /// Classify an already-parsed value: array, then wrapper keys, then single item
    pub fn from_value(value: Value, wrapper_keys: &[&'static str]) -> Self {
        match value {
            Value::Array(items) => Self::BareList(items),
            Value::Object(mut map) => {
                for key in wrapper_keys {
                    if matches!(map.get(*key), Some(Value::Array(_))) {
                        if let Some(Value::Array(items)) = map.remove(*key) {
                            return Self::WrappedObject { key, items };
                        }
                    }
                }
                if map.contains_key("description") {
                    Self::SingleItem(map)
                } else {
                    Self::Unparsable
                }
            }
            _ => Self::Unparsable,
        }
    }

    /// Flatten into candidate items, `None` when unparsable
    pub fn into_items(self) -> Option<Vec<Value>> {
        match self {
            Self::BareList(items) => Some(items),
            Self::WrappedObject { items, .. } => Some(items),
            Self::SingleItem(map) => Some(vec![Value::Object(map)]),
            Self::Unparsable => None,
        }
    }

    pub fn is_unparsable(&self) -> bool {
        matches!(self, Self::Unparsable)
    }
}

/// Extract the first JSON value from text
///
/// Tries the whole trimmed text first, then every balanced `{...}` / `[...]`
/// substring from left to right until one parses. An opener that never
/// closes ends the scan.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    for (start, c) in trimmed.char_indices() {
        if c != '{' && c != '[' {
            continue;
        }
        let end = balanced_end(&trimmed[start..])?;
        if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..start + end]) {
            return Some(value);
        }
    }

    None
}

/// Byte length of the balanced bracket group at the start of `s`
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Read a text field, stringifying scalars
pub fn str_field(item: &Map<String, Value>, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a list of strings; a bare string becomes a one-element list
pub fn str_list_field(item: &Map<String, Value>, key: &str) -> Vec<String> {
    match item.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => vec![],
    }
}

/// Read an integer field that may arrive as a number, float, or numeric string
pub fn int_field(item: &Map<String, Value>, key: &str) -> Option<i64> {
    match item.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// Read a truthy flag (`true`, `"true"`, `"yes"`, `1`)
pub fn bool_field(item: &Map<String, Value>, key: &str) -> bool {
    match item.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// Candidate objects that carry a non-empty `description`
pub fn described_items(items: Vec<Value>) -> Vec<Map<String, Value>> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .filter(|map| str_field(map, "description").is_some_and(|d| !d.is_empty()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEYS: &[&str] = &["lessons", "results", "data"];

    #[test]
    fn test_extract_bare_json() {
        let value = extract_json(r#"[{"description": "x"}]"#).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn test_extract_json_wrapped_in_prose() {
        let text = "Sure! Here you go:\n```json\n{\"achieved\": true, \"explanation\": \"ate {lots}\"}\n```\nHope it helps.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["achieved"], json!(true));
        assert_eq!(value["explanation"], json!("ate {lots}"));
    }

    #[test]
    fn test_extract_skips_broken_candidates() {
        let text = "{not json} then [1, 2, 3]";
        assert_eq!(extract_json(text), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_extract_garbage() {
        assert!(extract_json("I could not think of any lessons.").is_none());
        assert!(extract_json("").is_none());
        assert!(extract_json("42").is_none());
        assert!(extract_json("{\"unterminated\": ").is_none());
    }

    #[test]
    fn test_extract_stops_at_unclosed_opener() {
        // truncated output: the inner fragment is not the answer
        assert!(extract_json(r#"{"lessons": [{"description": "a"}]"#).is_none());

        let flood = format!("{} {}", "{".repeat(50_000), r#"{"a": 1}"#);
        assert!(extract_json(&flood).is_none());

        assert_eq!(extract_json(r#"[1] {"a": "#), Some(json!([1])));
    }

    #[test]
    fn test_classify_bare_list() {
        let result = OracleExtractionResult::from_response(r#"[{"description": "a"}]"#, KEYS);
        assert!(matches!(result, OracleExtractionResult::BareList(ref items) if items.len() == 1));
    }

    #[test]
    fn test_classify_wrapped_object() {
        let result = OracleExtractionResult::from_response(
            r#"{"results": [{"description": "a"}, {"description": "b"}]}"#,
            KEYS,
        );
        match result {
            OracleExtractionResult::WrappedObject { key, items } => {
                assert_eq!(key, "results");
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_wrapper_key_order() {
        let value = json!({"data": [1], "lessons": [1, 2]});
        match OracleExtractionResult::from_value(value, KEYS) {
            OracleExtractionResult::WrappedObject { key, .. } => assert_eq!(key, "lessons"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_single_item() {
        let result = OracleExtractionResult::from_response(r#"{"description": "solo"}"#, KEYS);
        assert!(matches!(result, OracleExtractionResult::SingleItem(_)));
        assert_eq!(result.into_items().unwrap().len(), 1);
    }

    #[test]
    fn test_classify_unrelated_object() {
        let result = OracleExtractionResult::from_response(r#"{"foo": "bar"}"#, KEYS);
        assert!(result.is_unparsable());
        assert!(result.into_items().is_none());
    }

    #[test]
    fn test_field_readers() {
        let item = json!({
            "description": "  eat ",
            "cycles": "3",
            "float_cycles": 2.6,
            "needs": "hunger",
            "flag": "Yes",
        });
        let map = item.as_object().unwrap();
        assert_eq!(str_field(map, "description").as_deref(), Some("eat"));
        assert_eq!(int_field(map, "cycles"), Some(3));
        assert_eq!(int_field(map, "float_cycles"), Some(3));
        assert_eq!(str_list_field(map, "needs"), vec!["hunger".to_string()]);
        assert!(bool_field(map, "flag"));
        assert!(!bool_field(map, "missing"));
    }

    #[test]
    fn test_described_items_filters_invalid() {
        let items = vec![
            json!({"description": "ok"}),
            json!({"description": ""}),
            json!({"category": "x"}),
            json!("just text"),
        ];
        assert_eq!(described_items(items).len(), 1);
    }
}
