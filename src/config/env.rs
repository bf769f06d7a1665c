//! Environment variable overlay.
//!
//! `EDGE_DETECTION_DETECTION__CONFIDENCE_THRESHOLD=0.7` becomes
//! `detection.confidence_threshold = 0.7`: the prefix is stripped, the rest
//! lowercased, and every `__` marks a nesting boundary.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Prefix shared by every configuration environment variable.
pub const ENV_PREFIX: &str = "EDGE_DETECTION_";

/// Collect dotted-path overrides from `vars`, keeping only names with `prefix`.
pub fn collect_overrides<I, K, V>(prefix: &str, vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut overrides = BTreeMap::new();
    for (name, value) in vars {
        let Some(rest) = name.as_ref().strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let path = rest.to_lowercase().replace("__", ".");
        overrides.insert(path, value.into());
    }
    overrides
}

/// Collect overrides from the process environment.
pub fn collect_env_overrides(prefix: &str) -> BTreeMap<String, String> {
    collect_overrides(prefix, std::env::vars())
}

/// Convert a raw environment string into a typed value.
///
/// Trial order, first match wins: boolean token, integer, float, string.
///
/// Boolean tokens are checked first, so `"1"` becomes `true` and `"0"`
/// becomes `false`, never the integers 1 and 0. Integer settings still accept
/// them because validation coerces booleans to 0/1.
pub fn convert_value(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => return Value::Bool(true),
        "false" | "no" | "0" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }

    if let Some(float) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(float);
    }

    Value::String(raw.to_string())
}

/// Write every override into `tree`, creating intermediate sections as needed.
///
/// An intermediate value that is not a mapping is replaced by one.
pub fn apply_overrides(tree: &mut Value, overrides: &BTreeMap<String, String>) {
    for (path, raw) in overrides {
        set_path(tree, path, convert_value(raw));
    }
}

fn set_path(tree: &mut Value, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut node = tree;
    for segment in segments {
        node = ensure_object(node)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(leaf.to_string(), value);
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}
