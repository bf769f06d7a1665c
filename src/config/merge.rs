//! Deep merge of configuration trees.
//!
//! Overlay values win on conflict. Nested objects merge key by key; lists and
//! scalars (including `null`) are replaced wholesale.

use serde_json::Value;

/// Deep merge two trees, consuming both, with `overlay` taking precedence.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans and nulls replace the base value
///
/// # Example
/// ```
/// use serde_json::json;
/// use edge_detection::config::deep_merge;
///
/// let base = json!({
///     "detection": { "confidence_threshold": 0.25, "iou_threshold": 0.45 },
///     "input": { "image_size": [640, 640] }
/// });
/// let overlay = json!({
///     "detection": { "confidence_threshold": 0.5 },
///     "input": { "image_size": [320, 320] }
/// });
/// let result = deep_merge(base, overlay);
/// assert_eq!(result["detection"]["iou_threshold"], 0.45);
/// assert_eq!(result["input"]["image_size"], json!([320, 320]));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge two borrowed trees into a new one, leaving both inputs untouched.
///
/// Use this when the same base is merged with several overlays, e.g. when
/// previewing more than one profile against one resolved tree.
pub fn merged(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut result = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.get(key) {
                    Some(base_value) => merged(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                result.insert(key.clone(), merged_value);
            }
            Value::Object(result)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Merge multiple values in order, with later values taking precedence.
///
/// Equivalent to folding `deep_merge` over the list.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}
