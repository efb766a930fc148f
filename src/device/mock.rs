//! Call-recording endpoint for tests.

use super::loopback::register_table;
use super::{
    DeviceEndpoint, Direction, RegisterParam, SampleRate, StreamDescriptor, StreamHandle,
    StreamStatus, SynthClock,
};
use crate::error::{IqLinkError, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Mock endpoint that records every call and can be told to fail.
///
/// Each call appends one line to the call log, for example
/// `start_stream(#3)` or `set_gain_db(0, TX, 40)`, so tests can assert on
/// ordering. Receive calls pop queued frames and time out otherwise.
#[derive(Debug)]
pub struct MockEndpoint {
    id: u32,
    error_message: String,
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    fail_on: HashSet<String>,
    next_handle: u32,
    streams: HashMap<u32, MockStream>,
    values: BTreeMap<String, f64>,
    registers: HashMap<String, u16>,
    rx_frames: VecDeque<Vec<i16>>,
    sent: Vec<Vec<i16>>,
}

#[derive(Debug)]
struct MockStream {
    descriptor: StreamDescriptor,
    active: bool,
    sent_symbols: u64,
    received_symbols: u64,
}

impl MockEndpoint {
    /// Create a mock endpoint with the given id.
    pub fn new(id: u32) -> Self {
        let registers = register_table()
            .into_iter()
            .map(|param| (param.name, param.default_value))
            .collect();
        Self {
            id,
            error_message: "mock endpoint error".to_string(),
            state: Mutex::new(MockState {
                next_handle: 1,
                registers,
                ..MockState::default()
            }),
        }
    }

    /// Make every call to `operation` fail.
    pub fn with_failure(self, operation: &str) -> Self {
        self.fail(operation);
        self
    }

    /// Make every later call to `operation` fail.
    pub fn fail(&self, operation: &str) {
        self.lock().fail_on.insert(operation.to_string());
    }

    /// Set the message carried by injected failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Queue one frame of interleaved samples for the next receive call.
    pub fn with_rx_frame(self, samples: Vec<i16>) -> Self {
        self.lock().rx_frames.push_back(samples);
        self
    }

    /// Preset a register value.
    pub fn with_register(self, name: &str, value: u16) -> Self {
        self.lock().registers.insert(name.to_string(), value);
        self
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Recorded calls whose operation name is `operation`.
    pub fn calls_named(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation}(");
        self.lock()
            .calls
            .iter()
            .filter(|call| call.as_str() == operation || call.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Every payload passed to `send`, in order.
    pub fn sent(&self) -> Vec<Vec<i16>> {
        self.lock().sent.clone()
    }

    /// Streams currently set up, as `(handle, descriptor, active)`.
    pub fn streams(&self) -> Vec<(StreamHandle, StreamDescriptor, bool)> {
        let state = self.lock();
        let mut streams: Vec<_> = state
            .streams
            .iter()
            .map(|(handle, s)| (StreamHandle(*handle), s.descriptor.clone(), s.active))
            .collect();
        streams.sort_by_key(|(handle, _, _)| handle.0);
        streams
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the log from the asserting one
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: &str, call: String) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.fail_on.contains(operation) {
            return Err(IqLinkError::endpoint(operation, self.error_message.clone()));
        }
        Ok(state)
    }

    fn set_value(&self, operation: &str, key: String, call: String, value: f64) -> Result<()> {
        let mut state = self.record(operation, call)?;
        state.values.insert(key, value);
        Ok(())
    }

    fn value(&self, operation: &str, key: String, call: String, fallback: f64) -> Result<f64> {
        let state = self.record(operation, call)?;
        Ok(state.values.get(&key).copied().unwrap_or(fallback))
    }
}

fn path_key(kind: &str, channel: usize, direction: Direction) -> String {
    format!("{kind}:{direction}:{channel}")
}

impl DeviceEndpoint for MockEndpoint {
    fn id(&self) -> u32 {
        self.id
    }

    fn reset(&self) -> Result<()> {
        self.record("reset", "reset".to_string()).map(drop)
    }

    fn init(&self) -> Result<()> {
        self.record("init", "init".to_string()).map(drop)
    }

    fn enable_channel(&self, direction: Direction, channel: usize, enabled: bool) -> Result<()> {
        self.record(
            "enable_channel",
            format!("enable_channel({direction}, {channel}, {enabled})"),
        )
        .map(drop)
    }

    fn set_antenna(&self, channel: usize, direction: Direction, port: usize) -> Result<()> {
        self.set_value(
            "set_antenna",
            path_key("antenna", channel, direction),
            format!("set_antenna({channel}, {direction}, {port})"),
            port as f64,
        )
    }

    fn antenna(&self, channel: usize, direction: Direction) -> Result<usize> {
        self.value(
            "antenna",
            path_key("antenna", channel, direction),
            format!("antenna({channel}, {direction})"),
            0.0,
        )
        .map(|port| port as usize)
    }

    fn set_lo_frequency(&self, channel: usize, direction: Direction, hz: f64) -> Result<()> {
        self.set_value(
            "set_lo_frequency",
            path_key("lo", channel, direction),
            format!("set_lo_frequency({channel}, {direction}, {hz})"),
            hz,
        )
    }

    fn lo_frequency(&self, channel: usize, direction: Direction) -> Result<f64> {
        self.value(
            "lo_frequency",
            path_key("lo", channel, direction),
            format!("lo_frequency({channel}, {direction})"),
            0.0,
        )
    }

    fn set_lowpass_bandwidth(
        &self,
        channel: usize,
        direction: Direction,
        hz: f64,
    ) -> Result<()> {
        self.set_value(
            "set_lowpass_bandwidth",
            path_key("lpbw", channel, direction),
            format!("set_lowpass_bandwidth({channel}, {direction}, {hz})"),
            hz,
        )
    }

    fn lowpass_bandwidth(&self, channel: usize, direction: Direction) -> Result<f64> {
        self.value(
            "lowpass_bandwidth",
            path_key("lpbw", channel, direction),
            format!("lowpass_bandwidth({channel}, {direction})"),
            0.0,
        )
    }

    fn set_gain_db(&self, channel: usize, direction: Direction, db: u32) -> Result<()> {
        self.set_value(
            "set_gain_db",
            path_key("gain", channel, direction),
            format!("set_gain_db({channel}, {direction}, {db})"),
            f64::from(db),
        )
    }

    fn gain_db(&self, channel: usize, direction: Direction) -> Result<u32> {
        self.value(
            "gain_db",
            path_key("gain", channel, direction),
            format!("gain_db({channel}, {direction})"),
            0.0,
        )
        .map(|db| db as u32)
    }

    fn set_sample_rate(&self, hz: f64, oversampling: u32) -> Result<()> {
        let mut state = self.record(
            "set_sample_rate",
            format!("set_sample_rate({hz}, {oversampling})"),
        )?;
        state.values.insert("rate".to_string(), hz);
        state
            .values
            .insert("oversampling".to_string(), f64::from(oversampling));
        Ok(())
    }

    fn sample_rate(&self, direction: Direction) -> Result<SampleRate> {
        let state = self.record("sample_rate", format!("sample_rate({direction})"))?;
        let host_hz = state.values.get("rate").copied().unwrap_or(0.0);
        let oversampling = state.values.get("oversampling").copied().unwrap_or(1.0);
        Ok(SampleRate {
            host_hz,
            rf_hz: host_hz * oversampling,
        })
    }

    fn calibrate(&self, direction: Direction, channel: usize, bandwidth_hz: f64) -> Result<()> {
        self.record(
            "calibrate",
            format!("calibrate({direction}, {channel}, {bandwidth_hz})"),
        )
        .map(drop)
    }

    fn set_gfir_lowpass(
        &self,
        direction: Direction,
        channel: usize,
        enabled: bool,
        bandwidth_hz: f64,
    ) -> Result<()> {
        self.record(
            "set_gfir_lowpass",
            format!("set_gfir_lowpass({direction}, {channel}, {enabled}, {bandwidth_hz})"),
        )
        .map(drop)
    }

    fn set_synth_clock(&self, clock: SynthClock, hz: f64) -> Result<()> {
        self.set_value(
            "set_synth_clock",
            format!("clock:{clock}"),
            format!("set_synth_clock({clock}, {hz})"),
            hz,
        )
    }

    fn synth_clock(&self, clock: SynthClock) -> Result<f64> {
        self.value(
            "synth_clock",
            format!("clock:{clock}"),
            format!("synth_clock({clock})"),
            0.0,
        )
    }

    fn tune_clock(&self, clock: SynthClock) -> Result<()> {
        self.record("tune_clock", format!("tune_clock({clock})"))
            .map(drop)
    }

    fn set_agc(&self, wanted_rssi: u32, enabled: bool) -> Result<()> {
        self.record("set_agc", format!("set_agc({wanted_rssi}, {enabled})"))
            .map(drop)
    }

    fn setup_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamHandle> {
        let mut state = self.lock();
        let handle = state.next_handle;
        state.calls.push(format!(
            "setup_stream({}, {}) -> #{handle}",
            descriptor.direction, descriptor.channel
        ));
        if state.fail_on.contains("setup_stream") {
            return Err(IqLinkError::endpoint(
                "setup_stream",
                self.error_message.clone(),
            ));
        }
        state.next_handle += 1;
        state.streams.insert(
            handle,
            MockStream {
                descriptor: descriptor.clone(),
                active: false,
                sent_symbols: 0,
                received_symbols: 0,
            },
        );
        Ok(StreamHandle(handle))
    }

    fn start_stream(&self, handle: StreamHandle) -> Result<()> {
        let mut state = self.record("start_stream", format!("start_stream({handle})"))?;
        let stream = state
            .streams
            .get_mut(&handle.0)
            .ok_or(IqLinkError::UnknownStream { handle: handle.0 })?;
        stream.active = true;
        Ok(())
    }

    fn stop_stream(&self, handle: StreamHandle) -> Result<()> {
        let mut state = self.record("stop_stream", format!("stop_stream({handle})"))?;
        let stream = state
            .streams
            .get_mut(&handle.0)
            .ok_or(IqLinkError::UnknownStream { handle: handle.0 })?;
        stream.active = false;
        Ok(())
    }

    fn destroy_stream(&self, handle: StreamHandle) -> Result<()> {
        let mut state = self.record("destroy_stream", format!("destroy_stream({handle})"))?;
        state
            .streams
            .remove(&handle.0)
            .map(drop)
            .ok_or(IqLinkError::UnknownStream { handle: handle.0 })
    }

    fn send(&self, handle: StreamHandle, samples: &[i16], _timeout_ms: u64) -> Result<usize> {
        let symbols = samples.len() / 2;
        let mut state = self.record("send", format!("send({handle}, {symbols})"))?;
        let stream = state
            .streams
            .get_mut(&handle.0)
            .ok_or(IqLinkError::UnknownStream { handle: handle.0 })?;
        stream.sent_symbols += symbols as u64;
        state.sent.push(samples.to_vec());
        Ok(symbols)
    }

    fn receive(
        &self,
        handle: StreamHandle,
        buffer: &mut [i16],
        count: usize,
        timeout_ms: u64,
    ) -> Result<usize> {
        let frame = {
            let mut state = self.record("receive", format!("receive({handle}, {count})"))?;
            if !state.streams.contains_key(&handle.0) {
                return Err(IqLinkError::UnknownStream { handle: handle.0 });
            }
            state.rx_frames.pop_front()
        };

        let Some(frame) = frame else {
            // Keep test loops from spinning at full speed
            std::thread::sleep(Duration::from_millis(1));
            return Err(IqLinkError::IoTimeout { timeout_ms });
        };

        let symbols = (frame.len() / 2).min(count).min(buffer.len() / 2);
        buffer[..symbols * 2].copy_from_slice(&frame[..symbols * 2]);
        if let Some(stream) = self.lock().streams.get_mut(&handle.0) {
            stream.received_symbols += symbols as u64;
        }
        Ok(symbols)
    }

    fn stream_status(&self, handle: StreamHandle) -> Result<StreamStatus> {
        let state = self.record("stream_status", format!("stream_status({handle})"))?;
        let stream = state
            .streams
            .get(&handle.0)
            .ok_or(IqLinkError::UnknownStream { handle: handle.0 })?;
        Ok(StreamStatus {
            active: stream.active,
            fifo_size: u32::try_from(stream.descriptor.fifo_size).unwrap_or(u32::MAX),
            timestamp: stream.sent_symbols + stream.received_symbols,
            ..StreamStatus::default()
        })
    }

    fn read_register(&self, name: &str) -> Result<u16> {
        let state = self.record("read_register", format!("read_register({name})"))?;
        state
            .registers
            .get(name)
            .copied()
            .ok_or_else(|| IqLinkError::UnknownRegister {
                name: name.to_string(),
            })
    }

    fn write_register(&self, name: &str, value: u16) -> Result<()> {
        let mut state = self.record(
            "write_register",
            format!("write_register({name}, {value})"),
        )?;
        match state.registers.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(IqLinkError::UnknownRegister {
                name: name.to_string(),
            }),
        }
    }

    fn register_params(&self) -> Vec<RegisterParam> {
        register_table()
    }

    fn describe(&self) -> String {
        format!("Mock endpoint {}", self.id)
    }
}
