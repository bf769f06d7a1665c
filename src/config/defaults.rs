//! Built-in configuration defaults.
//!
//! The default tree is built once and never handed out by reference for
//! mutation; every load starts from a fresh clone.

use serde_json::{Value, json};
use std::sync::LazyLock;

/// Top-level sections every resolved tree carries.
pub const SECTIONS: &[&str] = &[
    "model",
    "device",
    "detection",
    "input",
    "output",
    "logging",
    "performance",
];

static DEFAULTS: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "model": {
            "name": "yolov8n",
            "weights_dir": "models",
            "weights": null,
            "checksum": null
        },
        "device": {
            "type": "auto",
            "fallback_to_cpu": true
        },
        "detection": {
            "confidence_threshold": 0.25,
            "iou_threshold": 0.45,
            "max_detections": 300,
            "classes": null
        },
        "input": {
            "image_size": [640, 640],
            "source": null
        },
        "output": {
            "format": "jpg",
            "dir": "output",
            "save_images": true,
            "show_labels": true,
            "show_confidence": true
        },
        "logging": {
            "level": "INFO",
            "format": "text",
            "file": null,
            "max_bytes": 10485760,
            "backups": 5
        },
        "performance": {
            "batch_size": 1,
            "workers": 4,
            "half_precision": false
        }
    })
});

/// The shared default tree, read-only.
pub(crate) fn defaults() -> &'static Value {
    &DEFAULTS
}

/// A fresh copy of the default configuration tree.
pub fn default_tree() -> Value {
    DEFAULTS.clone()
}
