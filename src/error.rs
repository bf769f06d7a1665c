//! Error types surfaced to operators.
//!
//! Every message is self-contained: it names the file or field involved and
//! ends with a `Hint:` line when the cause is something the operator can fix.

use crate::config::{FileError, ProfileError, SchemaError};
use crate::detector::DetectorError;
use crate::security::ChecksumError;
use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes used by the CLI.
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const FAILURE: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
    pub const CHECKSUM_MISMATCH: u8 = 3;
}

/// Umbrella error for configuration loading and access.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "configuration has not been loaded\n\
         Hint: call load() on the configuration manager before reading values"
    )]
    NotLoaded,

    #[error("failed to load profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("invalid configuration file {}: {source}", .path.display())]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: FileError,
    },

    #[error(
        "configuration key '{key}' has an unexpected type: {source}\n\
         Hint: check the value with `edge-detection config get {key}`"
    )]
    TypeMismatch {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ConfigError {
    pub fn exit_code(&self) -> u8 {
        exit_codes::CONFIG_ERROR
    }
}

/// Exit code for an error reaching the top of the binary.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(config_err) = err.downcast_ref::<ConfigError>() {
        return config_err.exit_code();
    }
    let checksum_err = err.downcast_ref::<ChecksumError>().or_else(|| {
        match err.downcast_ref::<DetectorError>() {
            Some(DetectorError::Checksum(inner)) => Some(inner),
            _ => None,
        }
    });
    match checksum_err {
        Some(ChecksumError::Mismatch { .. }) => exit_codes::CHECKSUM_MISMATCH,
        _ => exit_codes::FAILURE,
    }
}
