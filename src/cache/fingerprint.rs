use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde_json::Value;

/// Deterministic fingerprint over a node's type, id, resolved inputs, and
/// configuration, used as the cache key for its invocation result.
///
/// JSON objects are serialized with sorted keys so that logically equal
/// inputs always produce the same fingerprint regardless of map order.
pub fn invocation_fingerprint(
    node_type: &str,
    node_id: &str,
    inputs: &HashMap<String, Value>,
    config: &Value,
) -> String {
    let mut hasher = DefaultHasher::new();
    node_type.hash(&mut hasher);
    node_id.hash(&mut hasher);

    let mut keys: Vec<&String> = inputs.keys().collect();
    keys.sort();
    for key in keys {
        key.hash(&mut hasher);
        canonical_string(&inputs[key]).hash(&mut hasher);
    }

    canonical_string(config).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = invocation_fingerprint(
            "transform",
            "n1",
            &inputs(&[("x", json!(1)), ("y", json!("s"))]),
            &json!({"factor": 2}),
        );
        let b = invocation_fingerprint(
            "transform",
            "n1",
            &inputs(&[("y", json!("s")), ("x", json!(1))]),
            &json!({"factor": 2}),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_sensitive_to_inputs() {
        let base = invocation_fingerprint("transform", "n1", &inputs(&[("x", json!(1))]), &json!({}));
        let changed =
            invocation_fingerprint("transform", "n1", &inputs(&[("x", json!(2))]), &json!({}));
        assert_ne!(base, changed);
    }

    #[test]
    fn test_fingerprint_sensitive_to_config_and_identity() {
        let base = invocation_fingerprint("transform", "n1", &HashMap::new(), &json!({"a": 1}));
        assert_ne!(
            base,
            invocation_fingerprint("transform", "n1", &HashMap::new(), &json!({"a": 2}))
        );
        assert_ne!(
            base,
            invocation_fingerprint("transform", "n2", &HashMap::new(), &json!({"a": 1}))
        );
        assert_ne!(
            base,
            invocation_fingerprint("filter", "n1", &HashMap::new(), &json!({"a": 1}))
        );
    }

    #[test]
    fn test_nested_object_key_order_ignored() {
        let a = invocation_fingerprint(
            "t",
            "n",
            &inputs(&[("payload", json!({"b": 2, "a": [1, {"z": 0, "y": 9}]}))]),
            &json!({}),
        );
        let b = invocation_fingerprint(
            "t",
            "n",
            &inputs(&[("payload", json!({"a": [1, {"y": 9, "z": 0}], "b": 2}))]),
            &json!({}),
        );
        assert_eq!(a, b);
    }
}
