//! Edge Detection Library
//!
//! Layered configuration, device selection and detector plumbing for the
//! `edge-detection` YOLO tool.

pub mod cli;
pub mod config;
pub mod detector;
pub mod device;
pub mod error;
pub mod logging;
pub mod security;
