use anyhow::Result;
use clap::{CommandFactory, Parser};
use iqlink::app::{StreamOptions, list_devices, run_stream_command};
use iqlink::cli::{Cli, Commands, ConfigAction};
use iqlink::config::Config;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Stream {
            source,
            tx,
            rx,
            continuous,
            modulation,
            timeout,
            results_dir,
        } => {
            let mut config = load_config(cli.config.as_deref())?;

            // Apply CLI overrides
            if continuous {
                config.stream.continuous = true;
            }
            if let Some(m) = modulation {
                config.stream.modulation = m;
            }
            if let Some(ms) = timeout {
                config.stream.io_timeout_ms = ms;
            }
            if let Some(dir) = results_dir {
                config.output.results_dir = dir;
            }

            let options = StreamOptions {
                source,
                tx_id: tx,
                rx_id: rx,
            };
            match run_stream_command(config, options, cli.quiet, cli.verbose).await {
                Ok(summary) => {
                    if cli.verbose >= 1 {
                        println!(
                            "{} {} symbols sent, {} received ({} bytes)",
                            "Done:".green(),
                            summary.sent_symbols,
                            summary.received_symbols,
                            summary.received_bytes
                        );
                    }
                }
                Err(e) => {
                    eprintln!("{}", format!("Error: {}", e).red());
                    std::process::exit(1);
                }
            }
        }
        Commands::Devices => {
            let config = load_config(cli.config.as_deref())?;
            let devices = list_devices(&config);
            if devices.is_empty() {
                eprintln!("No endpoints configured (sim.endpoints = 0)");
                std::process::exit(1);
            }
            println!("Available endpoints:");
            for device in devices {
                println!("  {}", device);
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "iqlink", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/iqlink/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        let default_path = Config::default_path();
        Config::load_or_default(&default_path)?
    };

    Ok(config.with_env_overrides())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                eprintln!(
                    "{}",
                    format!("Config already exists: {}", config_path.display()).yellow()
                );
                eprintln!("Use --force to overwrite it.");
                std::process::exit(1);
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_path, Config::default().to_toml()?)?;
            println!("{} {}", "Wrote".green(), config_path.display());
        }
    }
    Ok(())
}
