//! iqlink - Bidirectional IQ streaming sessions for software-defined radios
//!
//! Modulates a file into IQ symbols, streams them from a TX endpoint to an
//! RX endpoint, demodulates what comes back and lets an operator retune the
//! radio while the streams are paused.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod buffer;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod control;
pub mod defaults;
pub mod device;
pub mod error;
pub mod modulation;
pub mod output;
pub mod session;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Core traits (source → modulate → endpoint → sink)
pub use device::DeviceEndpoint;
pub use modulation::SymbolMapper;
pub use modulation::pipeline::SourceData;
pub use session::sink::{CollectorSink, FileSink, SampleSink};

// Session
pub use session::{SessionConfig, SessionState, SessionSummary, StreamSession};

// Error handling
pub use error::{IqLinkError, Result};

// Config
pub use config::Config;

pub use modulation::Modulation;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
