use serde_json::Value;
use std::collections::BTreeMap;

/// Flattens nested parameter data into the flat string map stylesheet parameters take.
///
/// Nested keys are joined with `-` and array elements are keyed by index, so
/// `{"page": {"title": "Home", "tags": ["a"]}}` gives `page-title = Home` and `page-tags-0 = a`.
/// A scalar at the top level has no name and yields an empty map.
pub fn flatten_parameters(value: Value) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    match value {
        Value::Object(_) | Value::Array(_) => flatten_into(&mut flat, None, value),
        other => log::debug!("Ignoring unnamed parameter value {}", other),
    }
    flat
}

fn flatten_into(flat: &mut BTreeMap<String, String>, prefix: Option<&str>, value: Value) {
    let join = |key: &str| match prefix {
        Some(prefix) => format!("{}-{}", prefix, key),
        None => key.to_string(),
    };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(flat, Some(&join(&key)), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.into_iter().enumerate() {
                flatten_into(flat, Some(&join(&index.to_string())), child);
            }
        }
        scalar => {
            if let Some(key) = prefix {
                flat.insert(key.to_string(), scalar_string(scalar));
            }
        }
    }
}

fn scalar_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_keys_are_joined() {
        let flat = flatten_parameters(json!({
            "root": "/srv",
            "page": { "title": "Home", "id": 4, "draft": false, "tags": ["a", "b"] },
            "missing": null
        }));
        assert_eq!(flat["root"], "/srv");
        assert_eq!(flat["page-title"], "Home");
        assert_eq!(flat["page-id"], "4");
        assert_eq!(flat["page-draft"], "false");
        assert_eq!(flat["page-tags-1"], "b");
        assert_eq!(flat["missing"], "");
        assert_eq!(flat.len(), 7);
    }

    #[test]
    fn top_level_scalar_is_dropped() {
        assert!(flatten_parameters(json!("x")).is_empty());
    }
}
