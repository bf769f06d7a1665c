//! Secret masking and model weight integrity checks.
//!
//! Checksums use a single canonical format, `sha256:<hex>`. Expected values
//! may also be given as bare hex.

use regex_lite::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Replacement for masked values.
pub const MASK: &str = "***";

/// Prefix for all checksums produced by this module.
const PREFIX: &str = "sha256:";

/// Key fragments whose values are never logged or printed.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "access_key",
    "private_key",
    "auth",
    "credential",
];

static KEY_VALUE_SECRET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b([a-z0-9_\-]*(?:password|passwd|secret|token|api[_\-]?key|access[_\-]?key|private[_\-]?key|credential)[a-z0-9_\-]*)(["']?\s*[:=]\s*["']?)([^\s"',;&]+)"#,
    )
    .expect("secret pattern is valid")
});

static BEARER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bearer\s+)[A-Za-z0-9\-._~+/]+=*").expect("bearer pattern is valid")
});

/// True if `key` names a value that must not be shown.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|fragment| key.contains(fragment))
}

/// Mask secrets embedded in free text.
///
/// Handles `key=value` and `key: value` pairs whose key names a secret, and
/// `Bearer <token>` credentials.
pub fn mask_secrets(text: &str) -> String {
    let masked = KEY_VALUE_SECRET.replace_all(text, |caps: &regex_lite::Captures<'_>| {
        format!("{}{}{}", &caps[1], &caps[2], MASK)
    });
    BEARER_TOKEN
        .replace_all(&masked, |caps: &regex_lite::Captures<'_>| {
            format!("{}{}", &caps[1], MASK)
        })
        .into_owned()
}

/// Copy of `value` with sensitive keys masked and strings scrubbed.
pub fn mask_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let masked: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let value = if is_sensitive_key(key) && !value.is_null() {
                        Value::String(MASK.to_string())
                    } else {
                        mask_value(value)
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_value).collect()),
        Value::String(s) => Value::String(mask_secrets(s)),
        other => other.clone(),
    }
}

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("cannot read {} for checksum: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "invalid expected checksum '{0}'\n\
         Hint: use 'sha256:<64 hex digits>' or the 64 hex digits alone"
    )]
    InvalidExpected(String),

    #[error(
        "checksum mismatch for {}\n  expected: {expected}\n  actual:   {actual}\n\
         Hint: the file may be corrupted or replaced; download the weights again \
         or update model.checksum",
        .path.display()
    )]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Compute the SHA-256 checksum of a file as `sha256:<hex>`.
///
/// Reads in chunks; model weights can be large.
pub fn compute_file_checksum(path: &Path) -> Result<String, ChecksumError> {
    let io_err = |source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Normalize an expected checksum to `sha256:<lowercase hex>`.
pub fn normalize_checksum(expected: &str) -> Result<String, ChecksumError> {
    let trimmed = expected.trim();
    let hex = match trimmed.get(..PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(PREFIX) => &trimmed[PREFIX.len()..],
        _ => trimmed,
    };
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChecksumError::InvalidExpected(expected.to_string()));
    }
    Ok(format!("{}{}", PREFIX, hex.to_ascii_lowercase()))
}

/// Verify that the file at `path` has the `expected` checksum.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), ChecksumError> {
    let expected = normalize_checksum(expected)?;
    let actual = compute_file_checksum(path)?;
    if actual == expected {
        Ok(())
    } else {
        Err(ChecksumError::Mismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }
}
