//! Radio endpoint capability interface.
//!
//! The session only ever talks to hardware through [`DeviceEndpoint`]. Methods
//! take `&self`; implementations synchronise internally so one endpoint can
//! be shared by the session loop and the input watcher.

pub mod loopback;
pub mod mock;

use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Signal path direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Tx,
    Rx,
}

impl Direction {
    /// Console convention: `true` selects TX, `false` RX.
    pub fn from_is_tx(is_tx: bool) -> Self {
        if is_tx { Direction::Tx } else { Direction::Rx }
    }

    pub fn both() -> [Direction; 2] {
        [Direction::Tx, Direction::Rx]
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "TX"),
            Direction::Rx => write!(f, "RX"),
        }
    }
}

/// Synthesiser clocks that can be read or retuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SynthClock {
    /// RX synthesiser
    Sxr = 1,
    /// TX synthesiser
    Sxt = 2,
    /// Clock generator
    Cgen = 3,
}

impl SynthClock {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(SynthClock::Sxr),
            2 => Some(SynthClock::Sxt),
            3 => Some(SynthClock::Cgen),
            _ => None,
        }
    }

    pub fn all() -> [SynthClock; 3] {
        [SynthClock::Sxr, SynthClock::Sxt, SynthClock::Cgen]
    }
}

impl fmt::Display for SynthClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthClock::Sxr => write!(f, "SXR"),
            SynthClock::Sxt => write!(f, "SXT"),
            SynthClock::Cgen => write!(f, "CGEN"),
        }
    }
}

/// Wire format of stream samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SampleFormat {
    /// Interleaved signed 16-bit I/Q
    #[default]
    I16,
}

/// Opaque handle of a stream created by [`DeviceEndpoint::setup_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StreamHandle(pub u32);

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameters for creating one channel stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDescriptor {
    pub channel: usize,
    pub direction: Direction,
    /// FIFO size in samples.
    pub fifo_size: usize,
    /// 0.0 favours latency, 1.0 throughput.
    pub throughput_vs_latency: f32,
    pub format: SampleFormat,
}

/// Snapshot of one stream's counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StreamStatus {
    pub active: bool,
    pub dropped_packets: u32,
    pub fifo_filled_count: u32,
    pub fifo_size: u32,
    /// Bytes per second moved over the host link.
    pub link_rate: f32,
    pub overrun: u32,
    pub underrun: u32,
    pub timestamp: u64,
}

/// Host and RF sample rates of one path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SampleRate {
    pub host_hz: f64,
    pub rf_hz: f64,
}

/// Description of one hardware register field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterParam {
    pub name: String,
    pub address: u16,
    pub msb: u8,
    pub lsb: u8,
    pub default_value: u16,
    pub tooltip: String,
}

impl RegisterParam {
    /// One listing line: `0xADDR / msb:lsb/default; name, tooltip`.
    pub fn listing(&self) -> String {
        format!(
            "0x{:04x} / {:2}:{:2}/{:3}; {}, {}",
            self.address, self.msb, self.lsb, self.default_value, self.name, self.tooltip
        )
    }

    /// Largest value the field can hold.
    pub fn max_value(&self) -> u16 {
        let width = u32::from(self.msb.saturating_sub(self.lsb)) + 1;
        1u32.checked_shl(width)
            .map_or(u16::MAX, |v| u16::try_from(v - 1).unwrap_or(u16::MAX))
    }
}

/// Hardware capability set consumed by the session.
///
/// Every call returns `Err` on failure. `send`/`receive` return
/// [`IqLinkError::IoTimeout`](crate::error::IqLinkError::IoTimeout) when the
/// bounded wait expires without moving data.
pub trait DeviceEndpoint: Send + Sync {
    /// Identity used for roster lookup and TX/RX aliasing checks.
    fn id(&self) -> u32;

    fn reset(&self) -> Result<()>;
    fn init(&self) -> Result<()>;

    fn enable_channel(&self, direction: Direction, channel: usize, enabled: bool) -> Result<()>;

    fn set_antenna(&self, channel: usize, direction: Direction, port: usize) -> Result<()>;
    fn antenna(&self, channel: usize, direction: Direction) -> Result<usize>;

    fn set_lo_frequency(&self, channel: usize, direction: Direction, hz: f64) -> Result<()>;
    fn lo_frequency(&self, channel: usize, direction: Direction) -> Result<f64>;

    fn set_lowpass_bandwidth(&self, channel: usize, direction: Direction, hz: f64)
    -> Result<()>;
    fn lowpass_bandwidth(&self, channel: usize, direction: Direction) -> Result<f64>;

    fn set_gain_db(&self, channel: usize, direction: Direction, db: u32) -> Result<()>;
    fn gain_db(&self, channel: usize, direction: Direction) -> Result<u32>;

    /// Set the host sample rate for both directions.
    fn set_sample_rate(&self, hz: f64, oversampling: u32) -> Result<()>;
    fn sample_rate(&self, direction: Direction) -> Result<SampleRate>;

    fn calibrate(&self, direction: Direction, channel: usize, bandwidth_hz: f64) -> Result<()>;

    /// Configure the digital GFIR low-pass filter of one path.
    fn set_gfir_lowpass(
        &self,
        direction: Direction,
        channel: usize,
        enabled: bool,
        bandwidth_hz: f64,
    ) -> Result<()>;

    fn set_synth_clock(&self, clock: SynthClock, hz: f64) -> Result<()>;
    fn synth_clock(&self, clock: SynthClock) -> Result<f64>;
    /// Retune a clock at its current frequency.
    fn tune_clock(&self, clock: SynthClock) -> Result<()>;

    /// Toggle RX automatic gain control towards `wanted_rssi`.
    fn set_agc(&self, wanted_rssi: u32, enabled: bool) -> Result<()>;

    fn setup_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamHandle>;
    fn start_stream(&self, handle: StreamHandle) -> Result<()>;
    fn stop_stream(&self, handle: StreamHandle) -> Result<()>;
    fn destroy_stream(&self, handle: StreamHandle) -> Result<()>;

    /// Push interleaved samples. Returns the number of symbols accepted.
    fn send(&self, handle: StreamHandle, samples: &[i16], timeout_ms: u64) -> Result<usize>;

    /// Pull up to `count` symbols into `buffer`. Returns the number received.
    fn receive(
        &self,
        handle: StreamHandle,
        buffer: &mut [i16],
        count: usize,
        timeout_ms: u64,
    ) -> Result<usize>;

    fn stream_status(&self, handle: StreamHandle) -> Result<StreamStatus>;

    fn read_register(&self, name: &str) -> Result<u16>;
    fn write_register(&self, name: &str, value: u16) -> Result<()>;
    /// Every register field this endpoint exposes.
    fn register_params(&self) -> Vec<RegisterParam>;

    /// Multi-line human readable description.
    fn describe(&self) -> String;
}

/// Available endpoints, looked up by id.
pub type Roster = [Arc<dyn DeviceEndpoint>];

/// Find an endpoint by id.
pub fn find_endpoint(roster: &Roster, id: u32) -> Option<&dyn DeviceEndpoint> {
    roster
        .iter()
        .find(|endpoint| endpoint.id() == id)
        .map(|endpoint| endpoint.as_ref())
}

#[cfg(test)]
mod tests {
    use super::mock::MockEndpoint;
    use super::*;

    #[test]
    fn direction_from_console_flag() {
        assert_eq!(Direction::from_is_tx(true), Direction::Tx);
        assert_eq!(Direction::from_is_tx(false), Direction::Rx);
        assert_eq!(Direction::Rx.to_string(), "RX");
    }

    #[test]
    fn synth_clock_ids() {
        assert_eq!(SynthClock::from_id(1), Some(SynthClock::Sxr));
        assert_eq!(SynthClock::from_id(3), Some(SynthClock::Cgen));
        assert_eq!(SynthClock::from_id(0), None);
        assert_eq!(SynthClock::Sxt as u8, 2);
    }

    #[test]
    fn register_listing_format() {
        let param = RegisterParam {
            name: "MAC".to_string(),
            address: 0x0020,
            msb: 1,
            lsb: 0,
            default_value: 3,
            tooltip: "Channel select".to_string(),
        };
        assert_eq!(param.listing(), "0x0020 /  1: 0/  3; MAC, Channel select");
        assert_eq!(param.max_value(), 3);
    }

    #[test]
    fn find_endpoint_by_id() {
        let roster: Vec<Arc<dyn DeviceEndpoint>> =
            vec![Arc::new(MockEndpoint::new(1)), Arc::new(MockEndpoint::new(7))];
        assert_eq!(find_endpoint(&roster, 7).map(|e| e.id()), Some(7));
        assert!(find_endpoint(&roster, 3).is_none());
    }
}
