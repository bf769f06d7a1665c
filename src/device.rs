//! Compute device selection.
//!
//! Device names come from `device.type` (`auto`, `cpu`, `cuda`, `cuda:<n>`,
//! `mps`, `tpu`, `onnx`). `auto` resolves by priority: CUDA, then Apple MPS,
//! then CPU. Host capabilities are read through [`DeviceProbe`] so selection
//! can be tested without hardware.

use crate::logging::Logger;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Device names accepted in configuration, besides `cuda:<index>`.
pub const DEVICE_NAMES: &[&str] = &["auto", "cpu", "cuda", "mps", "tpu", "onnx"];

/// A compute device as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Auto,
    Cpu,
    /// CUDA GPU, optionally pinned to one index.
    Cuda(Option<u64>),
    Mps,
    Tpu,
    Onnx,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown device '{0}'")]
pub struct ParseDeviceError(pub String);

impl FromStr for DeviceType {
    type Err = ParseDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "auto" => Ok(DeviceType::Auto),
            "cpu" => Ok(DeviceType::Cpu),
            "cuda" => Ok(DeviceType::Cuda(None)),
            "mps" => Ok(DeviceType::Mps),
            "tpu" => Ok(DeviceType::Tpu),
            "onnx" => Ok(DeviceType::Onnx),
            other => other
                .strip_prefix("cuda:")
                .filter(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
                // Digits only, so parsing fails only on overflow. No host has
                // that many GPUs; selection treats it as unavailable.
                .map(|index| index.parse().unwrap_or(u64::MAX))
                .map(|index| DeviceType::Cuda(Some(index)))
                .ok_or_else(|| ParseDeviceError(s.to_string())),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Auto => write!(f, "auto"),
            DeviceType::Cpu => write!(f, "cpu"),
            DeviceType::Cuda(None) => write!(f, "cuda"),
            DeviceType::Cuda(Some(index)) => write!(f, "cuda:{index}"),
            DeviceType::Mps => write!(f, "mps"),
            DeviceType::Tpu => write!(f, "tpu"),
            DeviceType::Onnx => write!(f, "onnx"),
        }
    }
}

impl Serialize for DeviceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Host capability checks.
pub trait DeviceProbe {
    /// Number of visible CUDA devices.
    fn cuda_device_count(&self) -> u32;
    fn mps_available(&self) -> bool;
    fn tpu_available(&self) -> bool;
    fn onnx_available(&self) -> bool;
}

/// Probe that inspects the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    fn cuda_device_count(&self) -> u32 {
        let installed = std::fs::read_dir("/proc/driver/nvidia/gpus")
            .map(|entries| entries.flatten().count())
            .unwrap_or(0);
        let installed = u32::try_from(installed).unwrap_or(u32::MAX);

        match std::env::var("CUDA_VISIBLE_DEVICES") {
            Ok(visible) => {
                let visible = visible.trim();
                if visible.is_empty() || visible == "-1" {
                    0
                } else {
                    installed.min(visible.split(',').count() as u32)
                }
            }
            Err(_) => installed,
        }
    }

    fn mps_available(&self) -> bool {
        cfg!(all(target_os = "macos", target_arch = "aarch64"))
    }

    fn tpu_available(&self) -> bool {
        Path::new("/dev/accel0").exists()
    }

    fn onnx_available(&self) -> bool {
        // ONNX export runs on the CPU execution provider.
        true
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(
        "requested device '{requested}' is not available on this host (available: {})\n\
         Hint: set device.type to 'auto' or enable device.fallback_to_cpu",
        .available.join(", ")
    )]
    Unavailable {
        requested: DeviceType,
        available: Vec<String>,
    },
}

/// Resolves configured devices against host capabilities.
pub struct DeviceManager<P: DeviceProbe = SystemProbe> {
    probe: P,
    fallback_to_cpu: bool,
    logger: Logger,
}

impl DeviceManager<SystemProbe> {
    pub fn new(logger: Logger) -> Self {
        Self::with_probe(SystemProbe, logger)
    }
}

impl<P: DeviceProbe> DeviceManager<P> {
    pub fn with_probe(probe: P, logger: Logger) -> Self {
        Self {
            probe,
            fallback_to_cpu: true,
            logger,
        }
    }

    pub fn fallback_to_cpu(mut self, enabled: bool) -> Self {
        self.fallback_to_cpu = enabled;
        self
    }

    /// Concrete devices usable on this host, best first.
    pub fn available(&self) -> Vec<DeviceType> {
        let mut devices = Vec::new();
        for index in 0..u64::from(self.probe.cuda_device_count()) {
            devices.push(DeviceType::Cuda(Some(index)));
        }
        if self.probe.mps_available() {
            devices.push(DeviceType::Mps);
        }
        if self.probe.tpu_available() {
            devices.push(DeviceType::Tpu);
        }
        if self.probe.onnx_available() {
            devices.push(DeviceType::Onnx);
        }
        devices.push(DeviceType::Cpu);
        devices
    }

    fn is_available(&self, device: DeviceType) -> bool {
        match device {
            DeviceType::Auto | DeviceType::Cpu => true,
            DeviceType::Cuda(None) => self.probe.cuda_device_count() > 0,
            DeviceType::Cuda(Some(index)) => index < u64::from(self.probe.cuda_device_count()),
            DeviceType::Mps => self.probe.mps_available(),
            DeviceType::Tpu => self.probe.tpu_available(),
            DeviceType::Onnx => self.probe.onnx_available(),
        }
    }

    /// Resolve `requested` to a concrete device.
    pub fn select(&self, requested: DeviceType) -> Result<DeviceType, DeviceError> {
        if requested == DeviceType::Auto {
            let selected = if self.probe.cuda_device_count() > 0 {
                DeviceType::Cuda(Some(0))
            } else if self.probe.mps_available() {
                DeviceType::Mps
            } else {
                DeviceType::Cpu
            };
            self.logger.info(&format!("Auto-selected device: {selected}"));
            return Ok(selected);
        }

        if self.is_available(requested) {
            let selected = match requested {
                DeviceType::Cuda(None) => DeviceType::Cuda(Some(0)),
                other => other,
            };
            self.logger.debug(&format!("Using requested device: {selected}"));
            return Ok(selected);
        }

        if self.fallback_to_cpu {
            self.logger.warning(&format!(
                "Device '{requested}' is not available, falling back to cpu"
            ));
            return Ok(DeviceType::Cpu);
        }

        Err(DeviceError::Unavailable {
            requested,
            available: self.available().iter().map(|d| d.to_string()).collect(),
        })
    }
}
