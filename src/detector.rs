//! Adapter between a validated configuration and a detection backend.
//!
//! The backend runs the model; this module turns its raw output into the
//! records the rest of the tool works with, applying the configured
//! thresholds and class filter.

use crate::config::ValidatedConfig;
use crate::device::DeviceType;
use crate::logging::Logger;
use crate::security::{ChecksumError, verify_checksum};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Error type returned by backends.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Axis-aligned box in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// One detection as produced by a backend, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A filtered, named detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Inference settings handed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub max_detections: usize,
    /// Width and height the backend resizes inputs to.
    pub image_size: [u32; 2],
    pub device: DeviceType,
    pub half_precision: bool,
    /// Class ids to keep; `None` keeps every class.
    pub classes: Option<Vec<u32>>,
}

impl InferenceParams {
    /// Build params from a validated configuration and the resolved device.
    pub fn from_config(config: &ValidatedConfig, device: DeviceType) -> Self {
        Self {
            confidence_threshold: config.detection.confidence_threshold,
            iou_threshold: config.detection.iou_threshold,
            max_detections: config.detection.max_detections as usize,
            image_size: config.input.image_size,
            device,
            half_precision: config.half_precision(),
            classes: config.class_filter(),
        }
    }

    fn keeps_class(&self, class_id: u32) -> bool {
        self.classes
            .as_ref()
            .is_none_or(|classes| classes.contains(&class_id))
    }
}

/// A model runtime that can run detection on a source.
///
/// Implement this to plug a concrete runtime into [`Detector`].
pub trait DetectionBackend {
    /// Class names indexed by class id.
    fn class_names(&self) -> &[String];

    /// Run inference on `source` (a file path, URL or stream id).
    fn infer(
        &mut self,
        source: &str,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, BackendError>;
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("inference failed for '{source_name}': {source}")]
    Backend {
        source_name: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

/// Runs a backend with configured post-processing.
pub struct Detector<B> {
    backend: B,
    params: InferenceParams,
    weights_checksum: Option<String>,
    logger: Logger,
}

impl<B: DetectionBackend> Detector<B> {
    pub fn new(backend: B, params: InferenceParams) -> Self {
        Self {
            backend,
            params,
            weights_checksum: None,
            logger: Logger::new().with_name("detector"),
        }
    }

    /// Detector configured from `config`, running on `device`.
    pub fn from_config(backend: B, config: &ValidatedConfig, device: DeviceType) -> Self {
        Self::new(backend, InferenceParams::from_config(config, device))
            .with_weights_checksum(config.weights_checksum().map(str::to_string))
    }

    pub fn with_weights_checksum(mut self, checksum: Option<String>) -> Self {
        self.weights_checksum = checksum;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn params(&self) -> &InferenceParams {
        &self.params
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Check the weights file against the configured checksum.
    ///
    /// Returns `Ok(false)` when no checksum is configured.
    pub fn verify_weights(&self, path: &Path) -> Result<bool, DetectorError> {
        let Some(expected) = &self.weights_checksum else {
            self.logger.debug(&format!(
                "No checksum configured, skipping verification of {}",
                path.display()
            ));
            return Ok(false);
        };
        verify_checksum(path, expected)?;
        self.logger
            .info(&format!("Verified weights checksum for {}", path.display()));
        Ok(true)
    }

    /// Run detection on `source`.
    ///
    /// Results under the confidence threshold or outside the class filter
    /// are dropped. The rest are sorted by confidence, highest first, and
    /// capped at `max_detections`.
    pub fn detect(&mut self, source: &str) -> Result<Vec<Detection>, DetectorError> {
        let raw = self
            .backend
            .infer(source, &self.params)
            .map_err(|source_err| DetectorError::Backend {
                source_name: source.to_string(),
                source: source_err,
            })?;
        let total = raw.len();

        let mut detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence.is_finite())
            .filter(|d| f64::from(d.confidence) >= self.params.confidence_threshold)
            .filter(|d| self.params.keeps_class(d.class_id))
            .map(|d| Detection {
                class_name: self.class_name(d.class_id),
                class_id: d.class_id,
                confidence: d.confidence,
                bbox: d.bbox,
            })
            .collect();

        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(self.params.max_detections);

        self.logger.debug(&format!(
            "{source}: kept {} of {total} detection(s)",
            detections.len()
        ));
        Ok(detections)
    }

    fn class_name(&self, class_id: u32) -> String {
        self.backend
            .class_names()
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}
