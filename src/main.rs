//! Edge Detection CLI
//!
//! Inspects the layered configuration, lists profiles, resolves the compute
//! device and checks model weight integrity.

use anyhow::Result;
use clap::Parser;
use edge_detection::cli::render::{render_sources, render_tree, render_value};
use edge_detection::cli::{ChecksumArgs, Cli, Command, ConfigCommand, ShowArgs};
use edge_detection::config::{ConfigManager, LoadOptions, ValidatedConfig};
use edge_detection::device::DeviceManager;
use edge_detection::error::{exit_code_for, exit_codes};
use edge_detection::logging::{self, Logger};
use edge_detection::security::{compute_file_checksum, mask_secrets, verify_checksum};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {}", mask_secrets(&err.to_string()));
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Root logger for this invocation; the profile rides along as context.
fn session_logger(cli: &Cli) -> Logger {
    match &cli.profile {
        Some(profile) => Logger::new().with_context("profile", profile.as_str()),
        None => Logger::new(),
    }
}

fn run(cli: Cli) -> Result<u8> {
    let mut manager =
        ConfigManager::new(cli.config_paths()).with_logger(session_logger(&cli).named("config"));
    if let Some(profile) = &cli.profile {
        manager = manager.with_profile(profile);
    }

    match &cli.command {
        Command::Profiles => {
            logging::init(&cli.log_settings(None))?;
            run_profiles(&manager)
        }
        Command::Checksum(args) => {
            logging::init(&cli.log_settings(None))?;
            run_checksum(args)
        }
        Command::Config(ConfigCommand::Show(args)) => {
            load(&cli, &mut manager, args.no_validate)?;
            run_show(&manager, args)
        }
        Command::Config(ConfigCommand::Get { key }) => {
            load(&cli, &mut manager, true)?;
            run_get(&manager, key)
        }
        Command::Config(ConfigCommand::Validate) => {
            load(&cli, &mut manager, false)?;
            run_validate(&manager)
        }
        Command::Config(ConfigCommand::Sources) => {
            load(&cli, &mut manager, true)?;
            println!("{}", render_sources(manager.sources()));
            Ok(exit_codes::SUCCESS)
        }
        Command::Device => {
            let config = load(&cli, &mut manager, false)?;
            run_device(session_logger(&cli).named("device"), config)
        }
    }
}

/// Load configuration, then install the subscriber using its `logging` section.
fn load<'a>(
    cli: &Cli,
    manager: &'a mut ConfigManager,
    skip_validation: bool,
) -> Result<Option<&'a ValidatedConfig>> {
    let options = LoadOptions {
        path: cli.config.clone(),
        profile: None,
        skip_validation,
    };
    manager.load(&options)?;
    logging::init(&cli.log_settings(manager.validated()))?;

    let logger = session_logger(cli).named("config");
    for source in manager.sources() {
        logger.debug(&format!("Loaded {source}"));
    }
    Ok(manager.validated())
}

fn run_show(manager: &ConfigManager, args: &ShowArgs) -> Result<u8> {
    let tree = manager.get_all()?;
    print!("{}", render_tree(&tree, args.json)?);
    if args.json {
        println!();
    }
    Ok(exit_codes::SUCCESS)
}

fn run_get(manager: &ConfigManager, key: &str) -> Result<u8> {
    match manager.get(key)? {
        Some(value) => {
            println!("{}", render_value(key, value)?);
            Ok(exit_codes::SUCCESS)
        }
        None => {
            eprintln!("Error: configuration key '{key}' not found");
            Ok(exit_codes::FAILURE)
        }
    }
}

fn run_validate(manager: &ConfigManager) -> Result<u8> {
    let Some(config) = manager.validated() else {
        anyhow::bail!("configuration was loaded without validation");
    };
    println!("Configuration is valid");
    println!("  model:      {}", config.model.name);
    println!("  weights:    {}", config.weights_path().display());
    println!("  device:     {}", config.device.kind);
    println!(
        "  thresholds: confidence {} / iou {}",
        config.detection.confidence_threshold, config.detection.iou_threshold
    );
    println!("  sources:    {}", manager.sources().len());
    Ok(exit_codes::SUCCESS)
}

fn run_profiles(manager: &ConfigManager) -> Result<u8> {
    let store = manager.profiles();
    let names = store.list();
    if names.is_empty() {
        println!("No profiles found in {}", store.dir().display());
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(exit_codes::SUCCESS)
}

fn run_device(logger: Logger, config: Option<&ValidatedConfig>) -> Result<u8> {
    let Some(config) = config else {
        anyhow::bail!("configuration was loaded without validation");
    };
    let devices = DeviceManager::new(logger)
        .fallback_to_cpu(config.fallback_to_cpu());

    let selected = devices.select(config.device.kind)?;
    let available: Vec<String> = devices.available().iter().map(|d| d.to_string()).collect();
    println!("Requested: {}", config.device.kind);
    println!("Selected:  {selected}");
    println!("Available: {}", available.join(", "));
    Ok(exit_codes::SUCCESS)
}

fn run_checksum(args: &ChecksumArgs) -> Result<u8> {
    match &args.expect {
        Some(expected) => {
            verify_checksum(&args.file, expected)?;
            println!("OK  {}", args.file.display());
        }
        None => {
            let checksum = compute_file_checksum(&args.file)?;
            println!("{checksum}  {}", args.file.display());
        }
    }
    Ok(exit_codes::SUCCESS)
}
