//! Schema validation of a resolved configuration tree.
//!
//! Only the fields below are checked; anything else in the tree is passed
//! through untouched.
//!
//! | Field                            | Rule                                   |
//! |----------------------------------|----------------------------------------|
//! | `model.name`                     | known model name or `custom`           |
//! | `device.type`                    | auto/cpu/cuda/mps/tpu/onnx or `cuda:N` |
//! | `detection.confidence_threshold` | float in [0.0, 1.0]                    |
//! | `detection.iou_threshold`        | float in [0.0, 1.0]                    |
//! | `detection.max_detections`       | integer in [1, 1000]                   |
//! | `input.image_size`               | exactly two positive integers          |
//! | `output.format`                  | jpg or png                             |
//! | `logging.level`                  | DEBUG/INFO/WARNING/ERROR/CRITICAL      |
//! | `logging.max_bytes`              | integer in [0, 1 GiB], 0 never rotates |
//! | `logging.backups`                | integer in [0, 100]                    |
//! | `performance.batch_size`         | integer in [1, 128]                    |
//! | `performance.workers`            | integer in [1, 16]                     |
//!
//! Values are coerced the lax way: integer fields take booleans, whole floats
//! and numeric strings; float fields take any number, booleans and numeric
//! strings. Enumerated names compare case-insensitively. A field missing from
//! the tree takes its default.

use super::defaults::{SECTIONS, defaults};
use super::files::kind_name;
use crate::device::{DEVICE_NAMES, DeviceType};
use crate::logging::{LOG_LEVEL_NAMES, LogLevel, LogRotation};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Model names accepted in `model.name`, besides `custom`.
pub const KNOWN_MODELS: &[&str] = &[
    "yolov5n", "yolov5s", "yolov5m", "yolov5l", "yolov5x", "yolov8n", "yolov8s", "yolov8m",
    "yolov8l", "yolov8x", "yolo11n", "yolo11s", "yolo11m", "yolo11l", "yolo11x",
];

/// Model name for user-supplied weights.
pub const CUSTOM_MODEL: &str = "custom";

/// Accepted `output.format` values.
pub const OUTPUT_FORMATS: &[&str] = &["jpg", "png"];

/// Upper bound for `logging.max_bytes` (1 GiB).
const MAX_LOG_BYTES: i64 = 1 << 30;

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    /// Dotted path of the field.
    pub field: String,
    /// The offending value as found in the tree.
    pub value: Value,
    pub message: String,
    /// Remediation line, always starting with `Hint:`.
    pub hint: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}: {}\n    {}",
            self.field, self.value, self.message, self.hint
        )
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub violations: Vec<FieldViolation>,
}

impl SchemaError {
    /// The violation for `field`, if that field failed.
    pub fn violation(&self, field: &str) -> Option<&FieldViolation> {
        self.violations.iter().find(|v| v.field == field)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration validation failed ({} error{})",
            self.violations.len(),
            if self.violations.len() == 1 { "" } else { "s" }
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

fn hint_for(field: &str) -> String {
    let hint = match field {
        "model.name" => format!(
            "model.name must be one of {} or '{CUSTOM_MODEL}' for your own weights",
            KNOWN_MODELS.join(", ")
        ),
        "device.type" => format!(
            "device.type must be one of {} or 'cuda:<index>' such as cuda:0",
            DEVICE_NAMES.join(", ")
        ),
        "detection.confidence_threshold" => "confidence_threshold must be between 0.0 and 1.0; \
             lower values keep more detections (typical: 0.25)"
            .to_string(),
        "detection.iou_threshold" => "iou_threshold must be between 0.0 and 1.0; \
             it controls how much boxes may overlap before suppression (typical: 0.45)"
            .to_string(),
        "detection.max_detections" => {
            "max_detections must be an integer between 1 and 1000".to_string()
        }
        "input.image_size" => {
            "image_size must be a list of exactly two positive integers, e.g. [640, 640]".to_string()
        }
        "output.format" => format!("output.format must be one of {}", OUTPUT_FORMATS.join(", ")),
        "logging.level" => format!("logging.level must be one of {}", LOG_LEVEL_NAMES.join(", ")),
        "logging.max_bytes" => format!(
            "max_bytes must be an integer between 0 and {MAX_LOG_BYTES}; 0 turns rotation off"
        ),
        "logging.backups" => "backups must be an integer between 0 and 100".to_string(),
        "performance.batch_size" => "batch_size must be an integer between 1 and 128".to_string(),
        "performance.workers" => "workers must be an integer between 1 and 16".to_string(),
        section => format!("'{section}' must be a mapping of settings"),
    };
    format!("Hint: {hint}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSettings {
    /// Lowercase model name.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSettings {
    #[serde(rename = "type")]
    pub kind: DeviceType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSettings {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub max_detections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSettings {
    /// Width and height in pixels.
    pub image_size: [u32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSettings {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub max_bytes: u64,
    pub backups: u32,
}

impl LoggingSettings {
    pub fn rotation(&self) -> LogRotation {
        LogRotation {
            max_bytes: self.max_bytes,
            backups: self.backups,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSettings {
    pub batch_size: u32,
    pub workers: u32,
}

/// A configuration tree that passed validation, with typed access to the
/// checked fields and lenient access to pass-through ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedConfig {
    pub model: ModelSettings,
    pub device: DeviceSettings,
    pub detection: DetectionSettings,
    pub input: InputSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
    pub performance: PerformanceSettings,
    /// The full tree, including unvalidated fields.
    #[serde(skip)]
    pub tree: Value,
}

impl ValidatedConfig {
    fn extra(&self, section: &str, key: &str) -> Option<&Value> {
        self.tree
            .get(section)
            .and_then(|s| s.get(key))
            .filter(|v| !v.is_null())
    }

    /// Explicit weights path, else `<weights_dir>/<name>.pt`.
    pub fn weights_path(&self) -> PathBuf {
        if let Some(weights) = self.extra("model", "weights").and_then(Value::as_str) {
            return PathBuf::from(weights);
        }
        let dir = self
            .extra("model", "weights_dir")
            .and_then(Value::as_str)
            .unwrap_or("models");
        PathBuf::from(dir).join(format!("{}.pt", self.model.name))
    }

    /// Expected checksum of the weights file, if configured.
    pub fn weights_checksum(&self) -> Option<&str> {
        self.extra("model", "checksum").and_then(Value::as_str)
    }

    pub fn fallback_to_cpu(&self) -> bool {
        self.extra("device", "fallback_to_cpu")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn half_precision(&self) -> bool {
        self.extra("performance", "half_precision")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Class ids to keep; `None` keeps every class.
    pub fn class_filter(&self) -> Option<Vec<u32>> {
        let classes = self.extra("detection", "classes")?.as_array()?;
        Some(
            classes
                .iter()
                .filter_map(|c| c.as_u64().and_then(|c| u32::try_from(c).ok()))
                .collect(),
        )
    }

    /// `logging.format` as written, if set.
    pub fn log_format(&self) -> Option<&str> {
        self.extra("logging", "format").and_then(Value::as_str)
    }

    pub fn log_file(&self) -> Option<&str> {
        self.extra("logging", "file").and_then(Value::as_str)
    }
}

/// Coerce to an integer: integers, booleans, whole floats, numeric strings.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce to a float: numbers, booleans, numeric strings.
fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

struct Checker<'a> {
    tree: &'a Value,
    violations: Vec<FieldViolation>,
}

impl<'a> Checker<'a> {
    fn reject(&mut self, field: &str, value: &Value, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.to_string(),
            value: value.clone(),
            message: message.into(),
            hint: hint_for(field),
        });
    }

    fn check_sections(&mut self) {
        for section in SECTIONS {
            if let Some(value) = self.tree.get(section)
                && !value.is_object()
            {
                let message = format!("expected a mapping, found {}", kind_name(value));
                self.reject(section, value, message);
            }
        }
    }

    /// The field's value from the tree, or its default when absent.
    fn lookup(&self, section: &str, key: &str) -> &'a Value {
        self.tree
            .get(section)
            .filter(|s| s.is_object())
            .and_then(|s| s.get(key))
            .unwrap_or(&defaults()[section][key])
    }

    fn int_in_range(&mut self, section: &str, key: &str, min: i64, max: i64) -> Option<u32> {
        let field = format!("{section}.{key}");
        let value = self.lookup(section, key);
        match coerce_int(value) {
            Some(n) if (min..=max).contains(&n) => u32::try_from(n).ok(),
            Some(_) => {
                self.reject(&field, value, format!("must be between {min} and {max}"));
                None
            }
            None => {
                let message = format!("expected an integer, found {}", kind_name(value));
                self.reject(&field, value, message);
                None
            }
        }
    }

    fn unit_interval(&mut self, section: &str, key: &str) -> Option<f64> {
        let field = format!("{section}.{key}");
        let value = self.lookup(section, key);
        match coerce_float(value) {
            Some(f) if (0.0..=1.0).contains(&f) => Some(f),
            Some(_) => {
                self.reject(&field, value, "must be between 0.0 and 1.0");
                None
            }
            None => {
                let message = format!("expected a number, found {}", kind_name(value));
                self.reject(&field, value, message);
                None
            }
        }
    }

    /// A string field parsed by `parse`; `expected` describes the accepted set.
    fn named<T>(
        &mut self,
        section: &str,
        key: &str,
        expected: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let field = format!("{section}.{key}");
        let value = self.lookup(section, key);
        let Some(raw) = value.as_str() else {
            let message = format!("expected a string, found {}", kind_name(value));
            self.reject(&field, value, message);
            return None;
        };
        let parsed = parse(raw);
        if parsed.is_none() {
            self.reject(&field, value, format!("must be one of {expected}"));
        }
        parsed
    }

    fn image_size(&mut self) -> Option<[u32; 2]> {
        let field = "input.image_size";
        let value = self.lookup("input", "image_size");
        let dims: Option<Vec<u32>> = value.as_array().filter(|a| a.len() == 2).and_then(|a| {
            a.iter()
                .map(|d| {
                    coerce_int(d)
                        .filter(|n| *n > 0)
                        .and_then(|n| u32::try_from(n).ok())
                })
                .collect()
        });
        match dims.as_deref() {
            Some([width, height]) => Some([*width, *height]),
            _ => {
                self.reject(field, value, "must contain exactly 2 positive integers");
                None
            }
        }
    }
}

/// Validate `tree`, returning the typed view or every violation found.
pub fn validate(tree: &Value) -> Result<ValidatedConfig, SchemaError> {
    let mut checker = Checker {
        tree,
        violations: Vec::new(),
    };

    checker.check_sections();

    let model_names = format!("{}, {CUSTOM_MODEL}", KNOWN_MODELS.join(", "));
    let model_name = checker.named("model", "name", &model_names, |raw| {
        let name = raw.trim().to_ascii_lowercase();
        (name == CUSTOM_MODEL || KNOWN_MODELS.contains(&name.as_str())).then_some(name)
    });

    let device_names = format!("{}, cuda:<index>", DEVICE_NAMES.join(", "));
    let device = checker.named("device", "type", &device_names, |raw| {
        raw.parse::<DeviceType>().ok()
    });

    let confidence = checker.unit_interval("detection", "confidence_threshold");
    let iou = checker.unit_interval("detection", "iou_threshold");
    let max_detections = checker.int_in_range("detection", "max_detections", 1, 1000);
    let image_size = checker.image_size();

    let format = checker.named("output", "format", &OUTPUT_FORMATS.join(", "), |raw| {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jpg" => Some(OutputFormat::Jpg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    });

    let level = checker.named("logging", "level", &LOG_LEVEL_NAMES.join(", "), |raw| {
        raw.parse::<LogLevel>().ok()
    });

    let max_bytes = checker.int_in_range("logging", "max_bytes", 0, MAX_LOG_BYTES);
    let backups = checker.int_in_range("logging", "backups", 0, 100);

    let batch_size = checker.int_in_range("performance", "batch_size", 1, 128);
    let workers = checker.int_in_range("performance", "workers", 1, 16);

    match (
        model_name,
        device,
        confidence,
        iou,
        max_detections,
        image_size,
        format,
        (level, max_bytes, backups),
        batch_size,
        workers,
    ) {
        (
            Some(name),
            Some(kind),
            Some(confidence_threshold),
            Some(iou_threshold),
            Some(max_detections),
            Some(image_size),
            Some(format),
            (Some(level), Some(max_bytes), Some(backups)),
            Some(batch_size),
            Some(workers),
        ) if checker.violations.is_empty() => Ok(ValidatedConfig {
            model: ModelSettings { name },
            device: DeviceSettings { kind },
            detection: DetectionSettings {
                confidence_threshold,
                iou_threshold,
                max_detections,
            },
            input: InputSettings { image_size },
            output: OutputSettings { format },
            logging: LoggingSettings {
                level,
                max_bytes: u64::from(max_bytes),
                backups,
            },
            performance: PerformanceSettings {
                batch_size,
                workers,
            },
            tree: tree.clone(),
        }),
        _ => Err(SchemaError {
            violations: checker.violations,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::default_tree;
    use serde_json::json;

    fn with(section: &str, key: &str, value: Value) -> Value {
        let mut tree = default_tree();
        tree[section][key] = value;
        tree
    }

    #[test]
    fn test_defaults_validate() {
        let config = validate(&default_tree()).unwrap();
        assert_eq!(config.model.name, "yolov8n");
        assert_eq!(config.device.kind, DeviceType::Auto);
        assert_eq!(config.detection.confidence_threshold, 0.25);
        assert_eq!(config.detection.max_detections, 300);
        assert_eq!(config.input.image_size, [640, 640]);
        assert_eq!(config.output.format, OutputFormat::Jpg);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.performance.workers, 4);
    }

    #[test]
    fn test_empty_tree_takes_defaults() {
        let config = validate(&json!({})).unwrap();
        assert_eq!(config.model.name, "yolov8n");
        assert_eq!(config.performance.batch_size, 1);
    }

    #[test]
    fn test_confidence_out_of_range() {
        let err = validate(&with("detection", "confidence_threshold", json!(1.5))).unwrap_err();
        let message = err.to_string();

        assert_eq!(err.violations.len(), 1);
        assert!(message.contains("1.5"));
        assert!(message.contains("0.0"));
        assert!(message.contains("1.0"));
        assert!(message.contains("Hint:"));
    }

    #[test]
    fn test_threshold_bounds_inclusive() {
        validate(&with("detection", "confidence_threshold", json!(0.0))).unwrap();
        validate(&with("detection", "iou_threshold", json!(1))).unwrap();
        assert!(validate(&with("detection", "iou_threshold", json!(-0.01))).is_err());
    }

    #[test]
    fn test_invalid_device_lists_choices() {
        let err = validate(&with("device", "type", json!("invalid_device"))).unwrap_err();
        let message = err.to_string();

        assert!(message.contains("invalid_device"));
        assert!(message.contains("auto, cpu, cuda"));
        assert!(err.violation("device.type").is_some());
    }

    #[test]
    fn test_cuda_index_device() {
        let config = validate(&with("device", "type", json!("cuda:1"))).unwrap();
        assert_eq!(config.device.kind, DeviceType::Cuda(Some(1)));

        let config = validate(&with("device", "type", json!("cuda:99999999999"))).unwrap();
        assert_eq!(config.device.kind, DeviceType::Cuda(Some(99_999_999_999)));
    }

    #[test]
    fn test_model_name_case_insensitive() {
        let config = validate(&with("model", "name", json!("YOLOv8S"))).unwrap();
        assert_eq!(config.model.name, "yolov8s");

        let config = validate(&with("model", "name", json!("custom"))).unwrap();
        assert_eq!(config.model.name, "custom");

        let err = validate(&with("model", "name", json!("resnet50"))).unwrap_err();
        assert!(err.to_string().contains("yolov8n"));
    }

    #[test]
    fn test_max_detections_range() {
        validate(&with("detection", "max_detections", json!(1000))).unwrap();
        let err = validate(&with("detection", "max_detections", json!(0))).unwrap_err();
        assert!(err.to_string().contains("between 1 and 1000"));
    }

    #[test]
    fn test_boolean_coerces_to_integer() {
        // An env override of "1" arrives as `true`.
        let config = validate(&with("performance", "workers", json!(true))).unwrap();
        assert_eq!(config.performance.workers, 1);

        assert!(validate(&with("performance", "workers", json!(false))).is_err());
    }

    #[test]
    fn test_numeric_strings_coerce() {
        let config = validate(&with("performance", "batch_size", json!("8"))).unwrap();
        assert_eq!(config.performance.batch_size, 8);

        let config = validate(&with("detection", "iou_threshold", json!("0.6"))).unwrap();
        assert_eq!(config.detection.iou_threshold, 0.6);

        assert!(validate(&with("performance", "batch_size", json!(2.5))).is_err());
    }

    #[test]
    fn test_image_size_shape() {
        validate(&with("input", "image_size", json!([320, 256]))).unwrap();
        for bad in [json!([640]), json!([640, 640, 3]), json!([640, 0]), json!("640x640")] {
            let err = validate(&with("input", "image_size", bad)).unwrap_err();
            assert!(err.to_string().contains("[640, 640]"));
        }
    }

    #[test]
    fn test_output_format_and_log_level() {
        let mut tree = with("output", "format", json!("PNG"));
        tree["logging"]["level"] = json!("debug");
        let config = validate(&tree).unwrap();
        assert_eq!(config.output.format, OutputFormat::Png);
        assert_eq!(config.logging.level, LogLevel::Debug);

        let mut tree = with("output", "format", json!("bmp"));
        tree["logging"]["level"] = json!("VERBOSE");
        let err = validate(&tree).unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert!(err.to_string().contains("jpg, png"));
        assert!(err.to_string().contains("DEBUG, INFO, WARNING, ERROR, CRITICAL"));
    }

    #[test]
    fn test_log_rotation_limits() {
        let config = validate(&json!({})).unwrap();
        assert_eq!(config.logging.rotation(), LogRotation::default());

        let mut tree = with("logging", "max_bytes", json!(0));
        tree["logging"]["backups"] = json!("3");
        let config = validate(&tree).unwrap();
        assert_eq!(config.logging.rotation(), LogRotation { max_bytes: 0, backups: 3 });

        let mut tree = with("logging", "max_bytes", json!(-1));
        tree["logging"]["backups"] = json!(101);
        let err = validate(&tree).unwrap_err();
        assert!(err.violation("logging.max_bytes").is_some());
        assert!(err.violation("logging.backups").unwrap().hint.contains("0 and 100"));
    }

    #[test]
    fn test_all_violations_reported_together() {
        let mut tree = default_tree();
        tree["detection"]["confidence_threshold"] = json!(2.0);
        tree["performance"]["batch_size"] = json!(500);
        tree["performance"]["workers"] = json!(0);

        let err = validate(&tree).unwrap_err();
        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "detection.confidence_threshold",
                "performance.batch_size",
                "performance.workers"
            ]
        );
        assert!(err.to_string().starts_with("configuration validation failed (3 errors)"));
    }

    #[test]
    fn test_section_not_mapping() {
        let mut tree = default_tree();
        tree["detection"] = json!("fast");
        let err = validate(&tree).unwrap_err();
        assert_eq!(err.violations[0].field, "detection");
        assert!(err.violations[0].hint.contains("mapping"));
    }

    #[test]
    fn test_null_field_rejected() {
        let err = validate(&with("detection", "confidence_threshold", Value::Null)).unwrap_err();
        assert!(err.to_string().contains("expected a number, found null"));
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let mut tree = default_tree();
        tree["custom_section"] = json!({"anything": [1, 2, 3]});
        tree["model"]["weights"] = json!("/opt/weights/best.pt");
        tree["detection"]["classes"] = json!([0, 2]);

        let config = validate(&tree).unwrap();
        assert_eq!(config.tree["custom_section"]["anything"], json!([1, 2, 3]));
        assert_eq!(config.weights_path(), PathBuf::from("/opt/weights/best.pt"));
        assert_eq!(config.class_filter(), Some(vec![0, 2]));
    }

    #[test]
    fn test_weights_path_from_dir() {
        let config = validate(&default_tree()).unwrap();
        assert_eq!(config.weights_path(), PathBuf::from("models").join("yolov8n.pt"));
        assert_eq!(config.weights_checksum(), None);
        assert!(config.fallback_to_cpu());
        assert_eq!(config.class_filter(), None);
    }
}
