/// Dotted-path lookup into JSON values
///
/// Paths look like `position.tokens.0.symbol`: object keys separated by dots,
/// numeric segments index into arrays. `items[2]` is accepted as `items.2`.

use serde_json::Value;

/// Walk `path` inside `value`, returning the addressed value if every segment resolves
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let normalized = path.replace('[', ".").replace(']', "");
    let mut current = value;

    for segment in normalized.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Split `nodeId.field.path` into the node id and the remaining path
pub fn split_reference(reference: &str) -> (&str, &str) {
    match reference.split_once('.') {
        Some((node_id, rest)) => (node_id, rest),
        None => (reference, ""),
    }
}

/// Extract the inner reference of a string made of exactly one `{{ ... }}` template
pub fn whole_template(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Render a value the way it appears when interpolated into a string
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
