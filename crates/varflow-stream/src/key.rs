use serde_json::Value;

/// Key of `item` at the dotted `accessor` path.
///
/// Path segments index objects by name and arrays by position. Only string and
/// number values are keys; anything else (or a missing segment) yields `None`.
pub fn extract_key(item: &Value, accessor: &str) -> Option<String> {
    let mut current = item;
    for segment in accessor.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
