//! Command line surface of the `edge-detection` binary.
//!
//! Global flags choose the config file, profile and log output; they are
//! accepted before or after the subcommand. [`Cli::log_settings`] folds them
//! together with the `logging` section of the loaded configuration.

pub mod render;

use crate::config::{ConfigPaths, ValidatedConfig};
use crate::logging::{LogFormat, LogLevel, LogRotation, LogSettings, LogTarget};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// YOLO edge detection configuration and device tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (replaces the user config file)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g. dev, prod, testing)
    #[arg(short, long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Directory holding profile files (default: ./config/profiles)
    #[arg(long, global = true, value_name = "DIR")]
    pub profiles_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, global = true)]
    pub log: Option<String>,

    /// Log line format (overrides logging.format)
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect the resolved configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// List available configuration profiles
    Profiles,

    /// Show the device that would be used and the devices available
    Device,

    /// Print or verify the SHA-256 checksum of a file
    Checksum(ChecksumArgs),
}

/// `config` subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the resolved configuration with secrets masked
    Show(ShowArgs),

    /// Print a single value by dotted key (e.g. detection.confidence_threshold)
    Get {
        /// Dotted key path
        key: String,
    },

    /// Load and validate the configuration
    Validate,

    /// List the sources that contributed to the configuration
    Sources,
}

/// Arguments for `config show`
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Print JSON instead of YAML
    #[arg(long)]
    pub json: bool,

    /// Print the tree even if it fails validation
    #[arg(long)]
    pub no_validate: bool,
}

/// Arguments for the checksum subcommand
#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// File to hash
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Expected checksum (`sha256:<hex>` or bare hex); exit 3 on mismatch
    #[arg(long, value_name = "HASH")]
    pub expect: Option<String>,
}

impl Cli {
    /// Config locations with CLI overrides applied.
    pub fn config_paths(&self) -> ConfigPaths {
        let mut paths = ConfigPaths::discover();
        if let Some(dir) = &self.profiles_dir {
            paths.profiles_dir = dir.clone();
        }
        paths
    }

    /// Logging settings. CLI flags win over the `logging` section.
    pub fn log_settings(&self, config: Option<&ValidatedConfig>) -> LogSettings {
        let level = if self.verbose {
            LogLevel::Debug
        } else {
            config.map_or(LogLevel::Info, |c| c.logging.level)
        };

        let format: LogFormat = match self.log_format {
            Some(arg) => arg.into(),
            None => config
                .and_then(|c| c.log_format())
                .and_then(|f| f.parse().ok())
                .unwrap_or_default(),
        };

        let target = match (&self.log, config.and_then(|c| c.log_file())) {
            (Some(spec), _) => LogTarget::parse(spec),
            (None, Some(file)) => LogTarget::File(PathBuf::from(file)),
            (None, None) => LogTarget::Stderr,
        };

        let rotation = config.map_or_else(LogRotation::default, |c| c.logging.rotation());

        LogSettings {
            level,
            format,
            target,
            rotation,
        }
    }
}
