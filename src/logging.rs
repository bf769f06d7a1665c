//! Logging handle and subscriber setup.
//!
//! Components never reach for a global logger. They receive a [`Logger`]
//! handle, which filters by level, masks secrets in messages and structured
//! data, and forwards to `tracing`. A logger may carry context fields, such
//! as the active profile, which are attached to every event it emits.
//!
//! The binary installs the `tracing` subscriber once via [`init`]. File
//! targets go through [`RotatingFile`], which rolls the file over by size.

use crate::security::{mask_secrets, mask_value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU8, Ordering},
};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

/// Log levels as named in `logging.level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Accepted `logging.level` names.
pub const LOG_LEVEL_NAMES: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic level filter shared between logger clones.
///
/// Stored as a u8: 0=Debug, 1=Info, 2=Warning, 3=Error, 4=Critical
#[derive(Debug)]
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    /// Create a filter that passes `level` and above.
    pub fn new(level: LogLevel) -> Self {
        Self(AtomicU8::new(level_to_u8(level)))
    }

    /// Get the current minimum level.
    pub fn get(&self) -> LogLevel {
        u8_to_level(self.0.load(Ordering::Relaxed))
    }

    /// Set the minimum level. All loggers sharing this filter see the change.
    pub fn set(&self, level: LogLevel) {
        self.0.store(level_to_u8(level), Ordering::Relaxed);
    }

    /// Check if a message at `level` passes the filter.
    pub fn should_log(&self, level: LogLevel) -> bool {
        level_to_u8(level) >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

fn level_to_u8(level: LogLevel) -> u8 {
    match level {
        LogLevel::Debug => 0,
        LogLevel::Info => 1,
        LogLevel::Warning => 2,
        LogLevel::Error => 3,
        LogLevel::Critical => 4,
    }
}

fn u8_to_level(val: u8) -> LogLevel {
    match val {
        0 => LogLevel::Debug,
        1 => LogLevel::Info,
        2 => LogLevel::Warning,
        3 => LogLevel::Error,
        _ => LogLevel::Critical,
    }
}

/// Convert a config log level to a tracing level.
pub fn log_level_to_tracing(level: LogLevel) -> Level {
    match level {
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warning => Level::WARN,
        LogLevel::Error | LogLevel::Critical => Level::ERROR,
    }
}

/// Logging handle passed to components.
///
/// Cheap to clone; clones share the level filter and copy the context.
#[derive(Debug, Clone)]
pub struct Logger {
    level_filter: Arc<LogLevelFilter>,
    name: Option<String>,
    context: Map<String, Value>,
}

impl Logger {
    /// Create a logger that passes every level, with no name or context.
    pub fn new() -> Self {
        Self {
            level_filter: Arc::new(LogLevelFilter::default()),
            name: None,
            context: Map::new(),
        }
    }

    /// Share `filter` with other loggers so one `set` adjusts them all.
    pub fn with_level_filter(mut self, filter: Arc<LogLevelFilter>) -> Self {
        self.level_filter = filter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// A child logger sharing this logger's filter under another name.
    pub fn named(&self, name: impl Into<String>) -> Self {
        self.clone().with_name(name)
    }

    /// Attach a context field to every event this logger emits.
    ///
    /// Context is copied into clones and [`named`](Self::named) children.
    /// Sensitive keys are masked like structured data.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn level_filter(&self) -> &Arc<LogLevelFilter> {
        &self.level_filter
    }

    /// Log a message, with optional structured data, after masking secrets.
    pub fn log(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        if !self.level_filter.should_log(level) {
            return;
        }

        let message = mask_secrets(message);
        let data = data.map(|d| mask_value(d).to_string());
        let context = (!self.context.is_empty())
            .then(|| mask_value(&Value::Object(self.context.clone())).to_string());
        let logger = self.name.as_deref().unwrap_or("edge_detection");
        let critical = level == LogLevel::Critical;

        // `None` fields are left out of the event.
        macro_rules! emit {
            ($macro:ident) => {
                tracing::$macro!(
                    logger,
                    critical,
                    context = context.as_deref(),
                    data = data.as_deref(),
                    "{}",
                    message
                )
            };
        }

        match level {
            LogLevel::Error | LogLevel::Critical => emit!(error),
            LogLevel::Warning => emit!(warn),
            LogLevel::Info => emit!(info),
            LogLevel::Debug => emit!(debug),
        }
    }

    /// Log with structured data, emitted as the `data` field.
    pub fn log_with_data(&self, level: LogLevel, message: &str, data: &Value) {
        self.log(level, message, Some(data));
    }

    /// Log at debug level.
    pub fn debug(&self, msg: &str) {
        self.log(LogLevel::Debug, msg, None);
    }

    /// Log at info level.
    pub fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg, None);
    }

    /// Log at warning level.
    pub fn warning(&self, msg: &str) {
        self.log(LogLevel::Warning, msg, None);
    }

    /// Log at error level.
    pub fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg, None);
    }

    /// Log at critical level. Emitted as a `tracing` error with `critical = true`.
    pub fn critical(&self, msg: &str) {
        self.log(LogLevel::Critical, msg, None);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// Line format for the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Off,
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// Parse the `--log` convention: `0/off`, `1/stdout`, `2/stderr`, or a filename.
    pub fn parse(spec: &str) -> Self {
        match spec {
            "0" | "off" => LogTarget::Off,
            "1" | "stdout" => LogTarget::Stdout,
            "2" | "stderr" => LogTarget::Stderr,
            filename => LogTarget::File(PathBuf::from(filename)),
        }
    }
}

/// Size-based rollover for file targets.
///
/// When a write would push the file past `max_bytes`, the file is renamed to
/// `<file>.1`, older backups shift up by one, and anything beyond `backups`
/// is dropped. `max_bytes == 0` never rotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    pub max_bytes: u64,
    pub backups: u32,
}

impl LogRotation {
    pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
    pub const DEFAULT_BACKUPS: u32 = 5;

    /// Never rotate.
    pub fn never() -> Self {
        Self {
            max_bytes: 0,
            backups: 0,
        }
    }

    fn should_rotate(&self, current: u64, incoming: usize) -> bool {
        self.max_bytes > 0 && current > 0 && current + incoming as u64 > self.max_bytes
    }
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            max_bytes: Self::DEFAULT_MAX_BYTES,
            backups: Self::DEFAULT_BACKUPS,
        }
    }
}

#[derive(Debug, Error)]
#[error(
    "cannot open log file {}: {source}\n\
     Hint: make sure the directory is writable, or set logging.file to null \
     (or pass --log 2) to log to stderr",
    .path.display()
)]
pub struct LogFileError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Open `path` for appending, creating missing parent directories.
pub fn open_log_file(path: &Path) -> Result<File, LogFileError> {
    let err = |source| LogFileError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(err)?;
    }
    OpenOptions::new().create(true).append(true).open(path).map_err(err)
}

#[derive(Debug)]
struct OpenLog {
    file: File,
    len: u64,
}

/// Append-only log file with size-based rotation.
///
/// `&RotatingFile` implements [`Write`], so an `Arc<RotatingFile>` can be
/// handed to the subscriber as its writer.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    rotation: LogRotation,
    state: Mutex<OpenLog>,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, rotation: LogRotation) -> Result<Self, LogFileError> {
        let path = path.into();
        let file = open_log_file(&path)?;
        let len = file
            .metadata()
            .map_err(|source| LogFileError {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(Self {
            path,
            rotation,
            state: Mutex::new(OpenLog { file, len }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the `n`th backup, e.g. `edge.log.2`.
    pub fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&self, log: &mut OpenLog) -> io::Result<()> {
        log.file.flush()?;
        if self.rotation.backups == 0 {
            log.file.set_len(0)?;
            log.len = 0;
            return Ok(());
        }

        let oldest = self.backup_path(self.rotation.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.rotation.backups).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;

        log.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        log.len = 0;
        Ok(())
    }
}

impl Write for &RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self
            .state
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        if self.rotation.should_rotate(log.len, buf.len()) {
            self.rotate(&mut log)?;
        }
        let written = log.file.write(buf)?;
        log.len += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?
            .file
            .flush()
    }
}

/// Subscriber settings, resolved from CLI flags and the `logging` section.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub target: LogTarget,
    /// Applies to [`LogTarget::File`] only.
    pub rotation: LogRotation,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            target: LogTarget::Stderr,
            rotation: LogRotation::default(),
        }
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the level.
///
/// A file target's parent directories are created as needed.
pub fn init(settings: &LogSettings) -> anyhow::Result<()> {
    let directive = log_level_to_tracing(settings.level)
        .as_str()
        .to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directive))?;

    let (writer, ansi) = match &settings.target {
        LogTarget::Off => return Ok(()),
        LogTarget::Stdout => (tracing_fmt::writer::BoxMakeWriter::new(std::io::stdout), true),
        LogTarget::Stderr => (tracing_fmt::writer::BoxMakeWriter::new(std::io::stderr), true),
        LogTarget::File(path) => {
            let file = RotatingFile::open(path, settings.rotation)?;
            (tracing_fmt::writer::BoxMakeWriter::new(Arc::new(file)), false)
        }
    };

    match settings.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_fmt::layer().json().with_writer(writer))
            .try_init()?,
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_fmt::layer()
                    .with_ansi(ansi)
                    .with_target(false)
                    .with_writer(writer),
            )
            .try_init()?,
    }

    Ok(())
}
