//! Command-line interface for iqlink
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Bidirectional IQ streaming sessions for software-defined radios
#[derive(Parser, Debug)]
#[command(
    name = "iqlink",
    version,
    about = "Bidirectional IQ streaming sessions for software-defined radios"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: pause and resize notices, -vv: per-cycle I/O errors)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a send/receive timeout into milliseconds.
///
/// Supports any duration format accepted by `humantime` (`100ms`, `2s`).
/// Bare numbers are milliseconds.
fn parse_timeout_ms(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(ms);
    }
    humantime::parse_duration(s)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream a file from the TX endpoint to the RX endpoint
    ///
    /// Type `p` and Enter to pause, `s` to send the buffer once, or a number
    /// to enable AGC with that RSSI target.
    Stream {
        /// File whose bytes are modulated and sent
        #[arg(long, short = 's', value_name = "FILE")]
        source: PathBuf,

        /// TX endpoint id
        #[arg(long, value_name = "ID", default_value = "1")]
        tx: u32,

        /// RX endpoint id (may equal the TX id)
        #[arg(long, value_name = "ID", default_value = "1")]
        rx: u32,

        /// Retransmit the buffer every cycle
        #[arg(long)]
        continuous: bool,

        /// Modulation scheme (bpsk, qpsk)
        #[arg(long, short = 'm', value_name = "NAME")]
        modulation: Option<String>,

        /// Send/receive timeout (e.g. 100ms, 1s)
        #[arg(long, value_name = "DURATION", value_parser = parse_timeout_ms)]
        timeout: Option<u64>,

        /// Directory for results and destination files
        #[arg(long, value_name = "DIR")]
        results_dir: Option<PathBuf>,
    },

    /// List the endpoints of the simulated roster
    Devices,

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
