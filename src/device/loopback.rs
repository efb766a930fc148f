//! Simulated radio that routes transmitted samples back to receivers.
//!
//! Endpoints created on the same [`Air`] share one medium: whatever any of
//! them sends on channel N lands in the receive FIFO of channel N. Used by the
//! binary to run sessions end-to-end without hardware.

use super::{
    DeviceEndpoint, Direction, RegisterParam, SampleRate, StreamDescriptor, StreamHandle,
    StreamStatus, SynthClock,
};
use crate::defaults;
use crate::error::{IqLinkError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Register fields exposed by simulated and mock endpoints.
pub fn register_table() -> Vec<RegisterParam> {
    const TABLE: &[(&str, u16, u8, u8, u16, &str)] = &[
        ("MAC", 0x0020, 1, 0, 1, "Selects the addressed channel (1 = A, 2 = B, 3 = both)"),
        ("EN_G_TRF", 0x0100, 0, 0, 1, "Enable control for all TRF modules"),
        ("SEL_BAND1_TRF", 0x0103, 11, 11, 1, "Enable TX output band 1"),
        ("SEL_BAND2_TRF", 0x0103, 10, 10, 0, "Enable TX output band 2"),
        ("CG_IAMP_TBB", 0x0108, 15, 10, 37, "Front-end gain of the TBB"),
        ("SEL_PATH_RFE", 0x010D, 8, 7, 1, "Active path of the RX front end"),
        ("G_LNA_RFE", 0x0113, 9, 6, 15, "Gain of the LNA"),
        ("G_PGA_RBB", 0x0119, 4, 0, 11, "Gain of the RBB PGA"),
        ("HBI_OVR_TXTSP", 0x0403, 14, 12, 0, "HBI interpolation ratio override"),
        ("HBD_OVR_RXTSP", 0x0603, 14, 12, 0, "HBD decimation ratio override"),
    ];
    TABLE
        .iter()
        .map(|&(name, address, msb, lsb, default_value, tooltip)| RegisterParam {
            name: name.to_string(),
            address,
            msb,
            lsb,
            default_value,
            tooltip: tooltip.to_string(),
        })
        .collect()
}

/// Shared medium carrying samples between loopback endpoints.
#[derive(Debug)]
pub struct Air {
    channels: Mutex<Vec<AirChannel>>,
    ready: Condvar,
    capacity: usize,
}

#[derive(Debug, Default, Clone)]
struct AirChannel {
    samples: VecDeque<i16>,
    overruns: u32,
    dropped: u32,
}

impl Air {
    /// A medium with `channels` lanes, each buffering up to `capacity` symbols.
    pub fn new(channels: usize, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(vec![AirChannel::default(); channels]),
            ready: Condvar::new(),
            capacity,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    /// Symbols waiting on a lane.
    pub fn pending(&self, channel: usize) -> usize {
        self.lock()
            .get(channel)
            .map_or(0, |lane| lane.samples.len() / 2)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AirChannel>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, channel: usize, samples: &[i16]) -> usize {
        let mut lanes = self.lock();
        let Some(lane) = lanes.get_mut(channel) else {
            return 0;
        };
        lane.samples.extend(samples);
        let held = lane.samples.len() / 2;
        if held > self.capacity {
            let excess = held - self.capacity;
            lane.samples.drain(..excess * 2);
            lane.overruns += 1;
            lane.dropped = lane
                .dropped
                .saturating_add(u32::try_from(excess).unwrap_or(u32::MAX));
        }
        drop(lanes);
        self.ready.notify_all();
        samples.len() / 2
    }

    fn pop(&self, channel: usize, buffer: &mut [i16], count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut lanes = self.lock();
        loop {
            let available = lanes.get(channel).map_or(0, |lane| lane.samples.len() / 2);
            if available > 0 {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            lanes = match self.ready.wait_timeout(lanes, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }

        let Some(lane) = lanes.get_mut(channel) else {
            return 0;
        };
        let symbols = (lane.samples.len() / 2).min(count).min(buffer.len() / 2);
        for (slot, sample) in buffer[..symbols * 2]
            .iter_mut()
            .zip(lane.samples.drain(..symbols * 2))
        {
            *slot = sample;
        }
        symbols
    }

    fn counters(&self, channel: usize) -> (u32, u32, u32) {
        self.lock().get(channel).map_or((0, 0, 0), |lane| {
            (
                u32::try_from(lane.samples.len() / 2).unwrap_or(u32::MAX),
                lane.overruns,
                lane.dropped,
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct PathSettings {
    enabled: bool,
    antenna: usize,
    lo_hz: f64,
    lowpass_hz: f64,
    gain_db: u32,
    gfir_hz: Option<f64>,
    calibrated_at: Option<f64>,
}

#[derive(Debug)]
struct LoopStream {
    descriptor: StreamDescriptor,
    active: bool,
    timestamp: u64,
    underrun: u32,
}

#[derive(Debug)]
struct LoopbackState {
    initialized: bool,
    paths: HashMap<(usize, Direction), PathSettings>,
    sample_rate_hz: f64,
    oversampling: u32,
    clocks: HashMap<SynthClock, f64>,
    agc: Option<u32>,
    registers: HashMap<String, u16>,
    streams: HashMap<u32, LoopStream>,
    next_handle: u32,
}

impl LoopbackState {
    fn fresh() -> Self {
        Self {
            initialized: false,
            paths: HashMap::new(),
            sample_rate_hz: 0.0,
            oversampling: 1,
            clocks: HashMap::new(),
            agc: None,
            registers: register_table()
                .into_iter()
                .map(|param| (param.name, param.default_value))
                .collect(),
            streams: HashMap::new(),
            next_handle: 1,
        }
    }
}

/// Simulated endpoint on a shared [`Air`].
#[derive(Debug)]
pub struct LoopbackEndpoint {
    id: u32,
    name: String,
    air: Arc<Air>,
    state: Mutex<LoopbackState>,
}

impl LoopbackEndpoint {
    pub fn new(id: u32, air: Arc<Air>) -> Self {
        Self {
            id,
            name: format!("loopback-{id}"),
            air,
            state: Mutex::new(LoopbackState::fresh()),
        }
    }

    /// Build `count` endpoints with ids starting at 1 on one fresh medium.
    pub fn roster(count: u32, channels: usize) -> Vec<Arc<dyn DeviceEndpoint>> {
        let air = Air::new(channels, defaults::RX_FIFO_SIZE);
        (1..=count)
            .map(|id| Arc::new(LoopbackEndpoint::new(id, Arc::clone(&air))) as Arc<dyn DeviceEndpoint>)
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_channel(&self, operation: &str, channel: usize) -> Result<()> {
        let channels = self.air.channel_count();
        if channel >= channels {
            return Err(IqLinkError::endpoint(
                operation,
                format!("channel {channel} out of range (endpoint has {channels})"),
            ));
        }
        Ok(())
    }

    fn with_path<T>(
        &self,
        operation: &str,
        channel: usize,
        direction: Direction,
        f: impl FnOnce(&mut PathSettings) -> T,
    ) -> Result<T> {
        self.check_channel(operation, channel)?;
        let mut state = self.lock();
        Ok(f(state.paths.entry((channel, direction)).or_default()))
    }

    fn with_stream<T>(
        &self,
        handle: StreamHandle,
        f: impl FnOnce(&mut LoopStream) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        let stream = state
            .streams
            .get_mut(&handle.0)
            .ok_or(IqLinkError::UnknownStream { handle: handle.0 })?;
        f(stream)
    }

    fn positive(operation: &str, what: &str, value: f64) -> Result<()> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(IqLinkError::endpoint(
                operation,
                format!("{what} must be positive, got {value}"),
            ))
        }
    }
}

impl DeviceEndpoint for LoopbackEndpoint {
    fn id(&self) -> u32 {
        self.id
    }

    fn reset(&self) -> Result<()> {
        *self.lock() = LoopbackState::fresh();
        Ok(())
    }

    fn init(&self) -> Result<()> {
        self.lock().initialized = true;
        Ok(())
    }

    fn enable_channel(&self, direction: Direction, channel: usize, enabled: bool) -> Result<()> {
        self.with_path("enable_channel", channel, direction, |path| {
            path.enabled = enabled;
        })
    }

    fn set_antenna(&self, channel: usize, direction: Direction, port: usize) -> Result<()> {
        if port > 3 {
            return Err(IqLinkError::endpoint(
                "set_antenna",
                format!("no antenna port {port}"),
            ));
        }
        self.with_path("set_antenna", channel, direction, |path| path.antenna = port)
    }

    fn antenna(&self, channel: usize, direction: Direction) -> Result<usize> {
        self.with_path("antenna", channel, direction, |path| path.antenna)
    }

    fn set_lo_frequency(&self, channel: usize, direction: Direction, hz: f64) -> Result<()> {
        Self::positive("set_lo_frequency", "LO frequency", hz)?;
        self.with_path("set_lo_frequency", channel, direction, |path| path.lo_hz = hz)?;
        let clock = match direction {
            Direction::Rx => SynthClock::Sxr,
            Direction::Tx => SynthClock::Sxt,
        };
        self.lock().clocks.insert(clock, hz);
        Ok(())
    }

    fn lo_frequency(&self, channel: usize, direction: Direction) -> Result<f64> {
        self.with_path("lo_frequency", channel, direction, |path| path.lo_hz)
    }

    fn set_lowpass_bandwidth(
        &self,
        channel: usize,
        direction: Direction,
        hz: f64,
    ) -> Result<()> {
        Self::positive("set_lowpass_bandwidth", "bandwidth", hz)?;
        self.with_path("set_lowpass_bandwidth", channel, direction, |path| {
            path.lowpass_hz = hz;
        })
    }

    fn lowpass_bandwidth(&self, channel: usize, direction: Direction) -> Result<f64> {
        self.with_path("lowpass_bandwidth", channel, direction, |path| {
            path.lowpass_hz
        })
    }

    fn set_gain_db(&self, channel: usize, direction: Direction, db: u32) -> Result<()> {
        if db > 73 {
            return Err(IqLinkError::endpoint(
                "set_gain_db",
                format!("gain {db} dB out of range (0..=73)"),
            ));
        }
        self.with_path("set_gain_db", channel, direction, |path| path.gain_db = db)
    }

    fn gain_db(&self, channel: usize, direction: Direction) -> Result<u32> {
        self.with_path("gain_db", channel, direction, |path| path.gain_db)
    }

    fn set_sample_rate(&self, hz: f64, oversampling: u32) -> Result<()> {
        Self::positive("set_sample_rate", "sample rate", hz)?;
        let oversampling = oversampling.max(1);
        let mut state = self.lock();
        state.sample_rate_hz = hz;
        state.oversampling = oversampling;
        state
            .clocks
            .insert(SynthClock::Cgen, hz * f64::from(oversampling) * 4.0);
        Ok(())
    }

    fn sample_rate(&self, _direction: Direction) -> Result<SampleRate> {
        let state = self.lock();
        Ok(SampleRate {
            host_hz: state.sample_rate_hz,
            rf_hz: state.sample_rate_hz * f64::from(state.oversampling),
        })
    }

    fn calibrate(&self, direction: Direction, channel: usize, bandwidth_hz: f64) -> Result<()> {
        Self::positive("calibrate", "calibration bandwidth", bandwidth_hz)?;
        self.with_path("calibrate", channel, direction, |path| {
            path.calibrated_at = Some(bandwidth_hz);
        })
    }

    fn set_gfir_lowpass(
        &self,
        direction: Direction,
        channel: usize,
        enabled: bool,
        bandwidth_hz: f64,
    ) -> Result<()> {
        if enabled {
            Self::positive("set_gfir_lowpass", "GFIR bandwidth", bandwidth_hz)?;
        }
        self.with_path("set_gfir_lowpass", channel, direction, |path| {
            path.gfir_hz = enabled.then_some(bandwidth_hz);
        })
    }

    fn set_synth_clock(&self, clock: SynthClock, hz: f64) -> Result<()> {
        Self::positive("set_synth_clock", "clock frequency", hz)?;
        self.lock().clocks.insert(clock, hz);
        Ok(())
    }

    fn synth_clock(&self, clock: SynthClock) -> Result<f64> {
        Ok(self.lock().clocks.get(&clock).copied().unwrap_or(0.0))
    }

    fn tune_clock(&self, clock: SynthClock) -> Result<()> {
        match self.lock().clocks.get(&clock) {
            Some(hz) if *hz > 0.0 => Ok(()),
            _ => Err(IqLinkError::endpoint(
                "tune_clock",
                format!("{clock} has no frequency to tune to"),
            )),
        }
    }

    fn set_agc(&self, wanted_rssi: u32, enabled: bool) -> Result<()> {
        self.lock().agc = enabled.then_some(wanted_rssi);
        Ok(())
    }

    fn setup_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamHandle> {
        self.check_channel("setup_stream", descriptor.channel)?;
        let mut state = self.lock();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.streams.insert(
            handle,
            LoopStream {
                descriptor: descriptor.clone(),
                active: false,
                timestamp: 0,
                underrun: 0,
            },
        );
        Ok(StreamHandle(handle))
    }

    fn start_stream(&self, handle: StreamHandle) -> Result<()> {
        self.with_stream(handle, |stream| {
            stream.active = true;
            Ok(())
        })
    }

    fn stop_stream(&self, handle: StreamHandle) -> Result<()> {
        self.with_stream(handle, |stream| {
            stream.active = false;
            Ok(())
        })
    }

    fn destroy_stream(&self, handle: StreamHandle) -> Result<()> {
        self.lock()
            .streams
            .remove(&handle.0)
            .map(drop)
            .ok_or(IqLinkError::UnknownStream { handle: handle.0 })
    }

    fn send(&self, handle: StreamHandle, samples: &[i16], _timeout_ms: u64) -> Result<usize> {
        let channel = self.with_stream(handle, |stream| {
            if stream.descriptor.direction != Direction::Tx {
                return Err(IqLinkError::endpoint("send", "stream is not a TX stream"));
            }
            if !stream.active {
                return Err(IqLinkError::endpoint("send", "stream is not started"));
            }
            stream.timestamp += (samples.len() / 2) as u64;
            Ok(stream.descriptor.channel)
        })?;
        Ok(self.air.push(channel, samples))
    }

    fn receive(
        &self,
        handle: StreamHandle,
        buffer: &mut [i16],
        count: usize,
        timeout_ms: u64,
    ) -> Result<usize> {
        let channel = self.with_stream(handle, |stream| {
            if stream.descriptor.direction != Direction::Rx {
                return Err(IqLinkError::endpoint("receive", "stream is not an RX stream"));
            }
            if !stream.active {
                return Err(IqLinkError::endpoint("receive", "stream is not started"));
            }
            Ok(stream.descriptor.channel)
        })?;

        let received = self
            .air
            .pop(channel, buffer, count, Duration::from_millis(timeout_ms));

        self.with_stream(handle, |stream| {
            if received == 0 {
                stream.underrun = stream.underrun.saturating_add(1);
                Err(IqLinkError::IoTimeout { timeout_ms })
            } else {
                stream.timestamp += received as u64;
                Ok(received)
            }
        })
    }

    fn stream_status(&self, handle: StreamHandle) -> Result<StreamStatus> {
        let (descriptor, active, timestamp, underrun, rate) = {
            let state = self.lock();
            let stream = state
                .streams
                .get(&handle.0)
                .ok_or(IqLinkError::UnknownStream { handle: handle.0 })?;
            (
                stream.descriptor.clone(),
                stream.active,
                stream.timestamp,
                stream.underrun,
                state.sample_rate_hz,
            )
        };

        let (fifo_filled_count, overrun, dropped_packets) = match descriptor.direction {
            Direction::Rx => self.air.counters(descriptor.channel),
            Direction::Tx => (0, 0, 0),
        };
        // Two 16-bit components per sample
        let link_rate = if active { (rate * 4.0) as f32 } else { 0.0 };

        Ok(StreamStatus {
            active,
            dropped_packets,
            fifo_filled_count,
            fifo_size: u32::try_from(descriptor.fifo_size).unwrap_or(u32::MAX),
            link_rate,
            overrun,
            underrun,
            timestamp,
        })
    }

    fn read_register(&self, name: &str) -> Result<u16> {
        self.lock()
            .registers
            .get(name)
            .copied()
            .ok_or_else(|| IqLinkError::UnknownRegister {
                name: name.to_string(),
            })
    }

    fn write_register(&self, name: &str, value: u16) -> Result<()> {
        let param = register_table()
            .into_iter()
            .find(|param| param.name == name)
            .ok_or_else(|| IqLinkError::UnknownRegister {
                name: name.to_string(),
            })?;
        if value > param.max_value() {
            return Err(IqLinkError::endpoint(
                "write_register",
                format!("{value} does not fit {name} ({}:{})", param.msb, param.lsb),
            ));
        }
        self.lock().registers.insert(param.name, value);
        Ok(())
    }

    fn register_params(&self) -> Vec<RegisterParam> {
        register_table()
    }

    fn describe(&self) -> String {
        let state = self.lock();
        let agc = match state.agc {
            Some(rssi) => format!("on (RSSI {rssi})"),
            None => "off".to_string(),
        };
        format!(
            "Endpoint {} ({})\n  Channels: {}\n  Initialized: {}\n  Sample rate: {:.3} MHz (RF {:.3} MHz)\n  AGC: {}\n  Streams: {}",
            self.id,
            self.name,
            self.air.channel_count(),
            state.initialized,
            state.sample_rate_hz / 1e6,
            state.sample_rate_hz * f64::from(state.oversampling) / 1e6,
            agc,
            state.streams.len(),
        )
    }
}
