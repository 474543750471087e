use serde_json::{Map, Value};

/// A leaf that differs between two payloads: dotted path, old, new.
pub(crate) type Change = (String, Value, Value);

/// Walk two JSON trees and collect leaf-level differences.
///
/// Keys present only in `previous` are reported with a `null` new value.
pub(crate) fn diff_json(previous: &Value, current: &Value, path_prefix: &str, changes: &mut Vec<Change>) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = join(path_prefix, key);
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => {
                        diff_json(&Value::Object(Map::new()), curr_val, &path, changes);
                    }
                    None => changes.push((path, Value::Null, curr_val.clone())),
                }
            }
            for (key, prev_val) in prev_map {
                if !curr_map.contains_key(key) {
                    changes.push((join(path_prefix, key), prev_val.clone(), Value::Null));
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changes(prev: Value, curr: Value) -> Vec<Change> {
        let mut out = Vec::new();
        diff_json(&prev, &curr, "", &mut out);
        out
    }

    #[test]
    fn diff_detects_leaf_change() {
        let out = changes(json!({"value": 0, "name": "home"}), json!({"value": 2, "name": "home"}));
        assert_eq!(out, vec![("value".to_string(), json!(0), json!(2))]);
    }

    #[test]
    fn diff_ignores_unchanged() {
        assert!(changes(json!({"value": 1}), json!({"value": 1})).is_empty());
    }

    #[test]
    fn diff_detects_new_nested_key() {
        let out = changes(json!({}), json!({"extra": {"battery": 80}}));
        assert_eq!(out, vec![("extra.battery".to_string(), Value::Null, json!(80))]);
    }

    #[test]
    fn diff_reports_removed_key() {
        let out = changes(json!({"value": 1, "alarm": true}), json!({"value": 1}));
        assert_eq!(out, vec![("alarm".to_string(), json!(true), Value::Null)]);
    }
}
