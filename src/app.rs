//! Streaming application entry point.
//!
//! Wires the simulated roster, the session, the results sink and the
//! operator console together. The session runs on a blocking task while
//! the async side waits for Ctrl+C.

use crate::config::Config;
use crate::control::console::Console;
use crate::device::loopback::LoopbackEndpoint;
use crate::error::{IqLinkError, Result};
use crate::session::signal::StopHandle;
use crate::session::sink::FileSink;
use crate::session::{SessionConfig, SessionSummary, StreamSession};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Options given to the `stream` command.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub source: PathBuf,
    pub tx_id: u32,
    pub rx_id: u32,
}

/// Run the stream command until the operator quits or Ctrl+C is pressed.
///
/// CLI overrides are expected to be applied to `config` already.
pub async fn run_stream_command(
    config: Config,
    options: StreamOptions,
    quiet: bool,
    verbosity: u8,
) -> Result<SessionSummary> {
    let stop = StopHandle::new();
    let session_stop = stop.clone();

    let mut task = tokio::task::spawn_blocking(move || {
        stream_blocking(&config, &options, quiet, verbosity, session_stop)
    });

    tokio::select! {
        joined = &mut task => return flatten(joined),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| IqLinkError::Other(format!("Failed to wait for Ctrl+C: {}", e)))?;
            if !quiet {
                eprintln!("\niqlink: stopping...");
            }
            stop.stop();
        }
    }

    flatten(task.await)
}

fn flatten(
    joined: std::result::Result<Result<SessionSummary>, tokio::task::JoinError>,
) -> Result<SessionSummary> {
    joined.map_err(|e| IqLinkError::Other(format!("Session task failed: {}", e)))?
}

fn stream_blocking(
    config: &Config,
    options: &StreamOptions,
    quiet: bool,
    verbosity: u8,
    stop: StopHandle,
) -> Result<SessionSummary> {
    let session_config = SessionConfig::from_config(config)?
        .with_quiet(quiet)
        .with_verbosity(verbosity);
    let channels = session_config.channels;
    let scheme = session_config.modulation.name();

    let roster = LoopbackEndpoint::roster(config.sim.endpoints, channels);
    let mut session = StreamSession::new(&roster, options.tx_id, options.rx_id, session_config)?
        .with_stop(stop.clone());

    if !quiet {
        eprintln!(
            "iqlink: TX {} -> RX {}, {} channel(s), {}",
            options.tx_id, options.rx_id, channels, scheme
        );
    }
    session.configure()?;

    let file = File::open(&options.source).map_err(|e| file_access(&options.source, e))?;
    let mut source = BufReader::new(file);

    let source_name = options
        .source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    let mut sink = FileSink::create(
        &config.output.results_dir,
        &source_name,
        channels,
        config.output.dump_format,
        scheme,
    )?
    .with_sample_rate(config.radio.sample_rate_hz as u32);

    let mut console = Console::stdio()
        .map_err(|e| IqLinkError::Other(format!("Failed to read stdin: {}", e)))?
        .with_stop(stop);

    if !quiet {
        eprintln!("iqlink: streaming, type p and Enter to pause");
        if verbosity >= 1 {
            eprintln!(
                "iqlink: results in {}",
                config.output.results_dir.display()
            );
        }
    }
    session.run(&mut source, &mut sink, &mut console)
}

fn file_access(path: &Path, e: std::io::Error) -> IqLinkError {
    IqLinkError::FileAccess {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// One line per endpoint of the simulated roster.
pub fn list_devices(config: &Config) -> Vec<String> {
    LoopbackEndpoint::roster(config.sim.endpoints, config.stream.channels)
        .iter()
        .map(|endpoint| format!("[{}] {}", endpoint.id(), endpoint.describe()))
        .collect()
}
