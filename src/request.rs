//! Builds nested YouTube request bodies from flat dotted property paths.
//!
//! `"snippet.title"` lands at `{"snippet": {"title": ...}}`. A trailing `[]`
//! on a segment (`"snippet.tags[]"`) marks a list: string values are split on
//! `,` before insertion. Null values, empty strings, empty lists and empty
//! objects are left out entirely so that a sparse update never blanks a field
//! on the remote side. Numbers and booleans are always kept; a playlist
//! position of `0` is meaningful.

use serde_json::{Map, Value};

/// Ordered list of `path -> value` pairs that turns into a request body.
#[derive(Debug, Clone, Default)]
pub struct RequestProperties {
    entries: Vec<(String, Value)>,
}

impl RequestProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.entries.push((path.to_string(), value.into()));
        self
    }

    /// Top-level parts touched by the properties, e.g. `"snippet,status"`.
    /// The bare `id` key is not a part.
    pub fn parts(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for (path, _) in &self.entries {
            let Some((head, _)) = path.split_once('.') else {
                continue;
            };
            let head = head.strip_suffix("[]").unwrap_or(head);
            if !parts.contains(&head) {
                parts.push(head);
            }
        }
        parts.join(",")
    }

    pub fn build(&self) -> Value {
        build_request_body(
            self.entries
                .iter()
                .map(|(path, value)| (path.as_str(), value.clone())),
        )
    }
}

pub fn build_request_body<'a, I>(properties: I) -> Value
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    let mut resource = Map::new();
    'properties: for (path, value) in properties {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((leaf, parents)) = segments.split_last() else {
            continue;
        };

        let (leaf, is_list) = match leaf.strip_suffix("[]") {
            Some(stripped) => (stripped, true),
            None => (*leaf, false),
        };
        let value = if is_list { split_list(value) } else { value };
        if is_empty_value(&value) {
            continue;
        }

        let mut target = &mut resource;
        for parent in parents {
            let parent = parent.strip_suffix("[]").unwrap_or(parent);
            let slot = target
                .entry(parent.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Some(map) = slot.as_object_mut() else {
                continue 'properties;
            };
            target = map;
        }
        target.insert(leaf.to_string(), value);
    }
    Value::Object(resource)
}

fn split_list(value: Value) -> Value {
    match value {
        Value::String(joined) if !joined.is_empty() => Value::Array(
            joined
                .split(',')
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
