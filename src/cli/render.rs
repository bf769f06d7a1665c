//! Output formatting for config commands.

use crate::config::ConfigSource;
use crate::security::{MASK, is_sensitive_key, mask_value};
use anyhow::Result;
use serde_json::Value;

/// Render a tree as YAML (default) or pretty JSON, secrets masked.
pub fn render_tree(tree: &Value, json: bool) -> Result<String> {
    let masked = mask_value(tree);
    if json {
        Ok(serde_json::to_string_pretty(&masked)?)
    } else {
        Ok(serde_yaml::to_string(&masked)?)
    }
}

/// Render the value found at `key`.
///
/// Scalars print bare (strings without quotes, null as `null`); mappings and
/// lists print as YAML.
pub fn render_value(key: &str, value: &Value) -> Result<String> {
    let last = key.rsplit('.').next().unwrap_or(key);
    if is_sensitive_key(last) && !value.is_null() {
        return Ok(MASK.to_string());
    }
    match mask_value(value) {
        Value::String(s) => Ok(s),
        Value::Null => Ok("null".to_string()),
        scalar @ (Value::Bool(_) | Value::Number(_)) => Ok(scalar.to_string()),
        nested => Ok(serde_yaml::to_string(&nested)?.trim_end().to_string()),
    }
}

/// One line per contributing source, lowest precedence first.
pub fn render_sources(sources: &[ConfigSource]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| format!("{}. {source}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigTier;
    use serde_json::json;

    #[test]
    fn tree_masks_secrets() {
        let tree = json!({"model": {"name": "yolov8n", "api_key": "abc"}});

        let yaml = render_tree(&tree, false).unwrap();
        assert!(yaml.contains("name: yolov8n"));
        assert!(yaml.contains("api_key:"));
        assert!(yaml.contains(MASK));
        assert!(!yaml.contains("abc"));

        let json = render_tree(&tree, true).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["model"]["api_key"], "***");
    }

    #[test]
    fn scalar_values_print_bare() {
        assert_eq!(render_value("model.name", &json!("yolov8n")).unwrap(), "yolov8n");
        assert_eq!(render_value("detection.iou_threshold", &json!(0.45)).unwrap(), "0.45");
        assert_eq!(render_value("output.save_images", &json!(true)).unwrap(), "true");
        assert_eq!(render_value("model.checksum", &Value::Null).unwrap(), "null");
    }

    #[test]
    fn nested_values_print_as_yaml() {
        let rendered = render_value("input.image_size", &json!([640, 480])).unwrap();
        assert_eq!(rendered, "- 640\n- 480");
    }

    #[test]
    fn sensitive_key_is_masked() {
        assert_eq!(render_value("hub.api_key", &json!("abc")).unwrap(), MASK);
        let nested = render_value("hub", &json!({"token": "abc", "url": "x"})).unwrap();
        assert!(nested.contains(MASK));
        assert!(nested.contains("url: x"));
        assert!(!nested.contains("abc"));
    }

    #[test]
    fn sources_are_numbered() {
        let sources = vec![
            ConfigSource {
                tier: ConfigTier::Defaults,
                detail: "built-in".into(),
            },
            ConfigSource {
                tier: ConfigTier::Project,
                detail: "config/config.yaml".into(),
            },
        ];
        assert_eq!(
            render_sources(&sources),
            "1. defaults: built-in\n2. project: config/config.yaml"
        );
    }
}
