//! Default configuration constants for iqlink.
//!
//! Shared by the configuration types, the session and the simulated endpoint
//! so every layer agrees on the same numbers.

/// Full-scale amplitude of a transmitted I or Q component.
///
/// Modulation is saturated: every constellation point sits at the maximum
/// positive or negative 16-bit value.
pub const FULL_SCALE: i16 = i16::MAX;

/// Smallest buffer, in symbols, handed to the hardware in continuous mode.
///
/// Shorter bursts starve the TX FIFO between send calls.
pub const MIN_CONTINUOUS_SYMBOLS: usize = 510;

/// Bound on every send/receive call in the session loop.
pub const IO_TIMEOUT_MS: u64 = 100;

/// Channels streamed per endpoint.
pub const NUM_CHANNELS: usize = 2;

/// Hardware FIFO size requested for each TX stream, in samples.
pub const TX_FIFO_SIZE: usize = 2 * 1024;

/// Hardware FIFO size requested for each RX stream, in samples.
pub const RX_FIFO_SIZE: usize = 10 * 1024;

/// Throughput versus latency trade-off handed to stream setup (0.0 = latency, 1.0 = throughput).
pub const THROUGHPUT_VS_LATENCY: f32 = 0.5;

/// Host sample rate in Hz.
pub const SAMPLE_RATE_HZ: f64 = 1e6;

/// RF oversampling factor applied on top of the host sample rate.
pub const OVERSAMPLING: u32 = 4;

/// Local oscillator frequency in Hz (2.45 GHz ISM band).
pub const LO_FREQUENCY_HZ: f64 = 2450e6;

/// Analog low-pass filter bandwidth in Hz.
pub const LOWPASS_BANDWIDTH_HZ: f64 = 5e6;

/// TX gain in dB.
pub const TX_GAIN_DB: u32 = 40;

/// RX gain in dB.
pub const RX_GAIN_DB: u32 = 40;

/// Antenna port selected on both directions at configuration time.
pub const ANTENNA_PORT: usize = 1;

/// Modulation used when a session starts.
pub const DEFAULT_MODULATION: &str = "bpsk";

/// Directory for results and destination files.
pub const RESULTS_DIR: &str = "results";

/// Register that selects which channel the SPI space addresses.
///
/// A value of 3 maps both channels at once; reading through it corrupts data.
pub const MAC_REGISTER: &str = "MAC";

/// MAC value that addresses both channels simultaneously.
pub const MAC_BOTH_CHANNELS: u16 = 3;

/// Register holding the TX interpolation override.
pub const INTERPOLATION_REGISTER: &str = "HBI_OVR_TXTSP";

/// Register holding the RX decimation override.
pub const DECIMATION_REGISTER: &str = "HBD_OVR_RXTSP";

/// Prompt shown while the session is paused.
pub const PAUSED_PROMPT: &str = "paused=>";
