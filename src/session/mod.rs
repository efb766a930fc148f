//! Streaming session: endpoint configuration, the send/receive loop and pause handling.

pub mod signal;
pub mod sink;

use crate::buffer::{BufferPlan, SymbolBuffer};
use crate::config::{Config, RadioConfig};
use crate::control::console::Console;
use crate::control::plane::{ControlPlane, PauseContext, PauseOutcome};
use crate::defaults;
use crate::device::{
    Direction, DeviceEndpoint, Roster, SampleFormat, StreamDescriptor, StreamHandle, find_endpoint,
};
use crate::error::{IqLinkError, Result};
use crate::modulation::pipeline::{ModulationPipeline, SourceData, source_len};
use crate::modulation::{Modulation, SymbolMapper, demodulate_bytes};
use signal::{PauseSignal, StopHandle, WatcherCancel, watch_input};
use sink::{ChannelStatus, ResultRecord, SampleSink};
use std::fmt;
use std::thread;

/// Lifecycle of a [`StreamSession`].
///
/// A session exists only once both endpoints resolve, so it starts in
/// `Configuring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configuring,
    Ready,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Configuring => "configuring",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Front-end parameters applied by [`StreamSession::configure`]
    pub radio: RadioConfig,
    /// Channels streamed on each endpoint
    pub channels: usize,
    /// Bound on every send/receive call
    pub io_timeout_ms: u64,
    pub tx_fifo_size: usize,
    pub rx_fifo_size: usize,
    pub throughput_vs_latency: f32,
    /// Retransmit the buffer every cycle instead of on request
    pub continuous: bool,
    /// Scheme used by both directions when the session starts
    pub modulation: Modulation,
    /// Suppress diagnostics on stderr
    pub quiet: bool,
    /// Verbosity level (0=milestones, 1=+pause and resize notices, 2=+per-cycle I/O errors)
    pub verbosity: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            channels: defaults::NUM_CHANNELS,
            io_timeout_ms: defaults::IO_TIMEOUT_MS,
            tx_fifo_size: defaults::TX_FIFO_SIZE,
            rx_fifo_size: defaults::RX_FIFO_SIZE,
            throughput_vs_latency: defaults::THROUGHPUT_VS_LATENCY,
            continuous: false,
            modulation: Modulation::default(),
            quiet: false,
            verbosity: 0,
        }
    }
}

impl SessionConfig {
    /// Build from the file configuration. Fails on an unknown modulation name.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            radio: config.radio.clone(),
            channels: config.stream.channels,
            io_timeout_ms: config.stream.io_timeout_ms,
            tx_fifo_size: config.stream.tx_fifo_size,
            rx_fifo_size: config.stream.rx_fifo_size,
            throughput_vs_latency: config.stream.throughput_vs_latency,
            continuous: config.stream.continuous,
            modulation: config.stream.modulation.parse()?,
            ..Self::default()
        })
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub cycles: u64,
    pub pauses: u32,
    pub sent_symbols: u64,
    pub received_symbols: u64,
    pub received_bytes: u64,
}

/// The TX/RX endpoint pair and the streams created on them.
pub struct Link<'a> {
    pub tx: &'a dyn DeviceEndpoint,
    pub rx: &'a dyn DeviceEndpoint,
    pub channels: usize,
    tx_streams: Vec<StreamHandle>,
    rx_streams: Vec<StreamHandle>,
}

impl<'a> Link<'a> {
    fn new(tx: &'a dyn DeviceEndpoint, rx: &'a dyn DeviceEndpoint, channels: usize) -> Self {
        Self {
            tx,
            rx,
            channels,
            tx_streams: Vec::new(),
            rx_streams: Vec::new(),
        }
    }

    /// TX and RX are different physical devices.
    pub fn distinct(&self) -> bool {
        self.tx.id() != self.rx.id()
    }

    /// Endpoints a mutating command applies to: TX, then RX when distinct.
    pub fn targets(&self) -> Vec<(&'static str, &'a dyn DeviceEndpoint)> {
        let mut targets = vec![("TX", self.tx)];
        if self.distinct() {
            targets.push(("RX", self.rx));
        }
        targets
    }

    pub fn tx_streams(&self) -> &[StreamHandle] {
        &self.tx_streams
    }

    pub fn rx_streams(&self) -> &[StreamHandle] {
        &self.rx_streams
    }

    /// Start every stream, RX before TX on each channel.
    fn start_all(&self) -> Result<()> {
        for (rx, tx) in self.rx_streams.iter().zip(&self.tx_streams) {
            self.rx.start_stream(*rx)?;
            self.tx.start_stream(*tx)?;
        }
        Ok(())
    }

    /// Stop every stream, RX before TX on each channel. Every stop is
    /// attempted; the first failure is returned.
    fn stop_all(&self) -> Result<()> {
        let mut first_error = None;
        for (rx, tx) in self.rx_streams.iter().zip(&self.tx_streams) {
            for result in [self.rx.stop_stream(*rx), self.tx.stop_stream(*tx)] {
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Status of both directions on every channel.
    pub fn status(&self) -> Result<Vec<ChannelStatus>> {
        self.tx_streams
            .iter()
            .zip(&self.rx_streams)
            .enumerate()
            .map(|(channel, (tx, rx))| {
                Ok(ChannelStatus {
                    channel,
                    tx: self.tx.stream_status(*tx)?,
                    rx: self.rx.stream_status(*rx)?,
                })
            })
            .collect()
    }

    /// Stop and destroy every stream. Handles are forgotten even on failure.
    fn release(&mut self) -> Result<()> {
        let mut first_error = None;
        let rx_streams = std::mem::take(&mut self.rx_streams);
        let tx_streams = std::mem::take(&mut self.tx_streams);
        let owned = rx_streams
            .into_iter()
            .map(|handle| (self.rx, handle))
            .chain(tx_streams.into_iter().map(|handle| (self.tx, handle)));
        for (endpoint, handle) in owned {
            let stopped = endpoint.stop_stream(handle);
            let destroyed = endpoint.destroy_stream(handle);
            if let Err(e) = stopped.and(destroyed) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Buffers, sizes and schemes the loop and the control plane share.
#[derive(Debug)]
pub struct LiveState {
    pub tx: SymbolBuffer,
    pub rx: SymbolBuffer,
    /// Symbols sent per burst
    pub tx_size: usize,
    /// Symbols requested per receive
    pub rx_size: usize,
    pub maximum_buffer_size: usize,
    pub tx_modulation: Modulation,
    pub rx_modulation: Modulation,
    pub pipeline: ModulationPipeline,
}

/// A bidirectional streaming session between a TX and an RX endpoint.
///
/// Construction resolves both endpoints, [`configure`](Self::configure)
/// prepares the hardware and [`run`](Self::run) streams until quit or
/// [`StopHandle::stop`]. Streams are released when the run ends or the
/// session is dropped.
pub struct StreamSession<'a> {
    link: Link<'a>,
    config: SessionConfig,
    state: SessionState,
    configured: bool,
    stop: StopHandle,
}

impl<'a> StreamSession<'a> {
    /// Resolve the TX and RX endpoints by id. The same id may serve both roles.
    pub fn new(roster: &'a Roster, tx_id: u32, rx_id: u32, config: SessionConfig) -> Result<Self> {
        let tx = find_endpoint(roster, tx_id).ok_or_else(|| IqLinkError::EndpointNotFound {
            role: "TX".to_string(),
            id: tx_id,
        })?;
        let rx = find_endpoint(roster, rx_id).ok_or_else(|| IqLinkError::EndpointNotFound {
            role: "RX".to_string(),
            id: rx_id,
        })?;

        Ok(Self {
            link: Link::new(tx, rx, config.channels),
            config,
            state: SessionState::Configuring,
            configured: false,
            stop: StopHandle::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn link(&self) -> &Link<'a> {
        &self.link
    }

    /// Handle that ends a running or paused session from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Share a stop handle created before the session.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    fn require(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(IqLinkError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    /// Reset and set up both endpoints, then create one RX and one TX stream per channel.
    ///
    /// When TX and RX are different devices each one also gets its other
    /// path configured. On failure the session stays Ready but cannot run.
    pub fn configure(&mut self) -> Result<()> {
        self.require(SessionState::Configuring)?;
        self.state = SessionState::Ready;

        self.configure_endpoints()?;
        self.create_streams()?;

        self.configured = true;
        if !self.config.quiet {
            eprintln!(
                "iqlink: configured TX endpoint {} and RX endpoint {} ({} channel(s))",
                self.link.tx.id(),
                self.link.rx.id(),
                self.config.channels
            );
        }
        Ok(())
    }

    fn configure_endpoints(&self) -> Result<()> {
        let radio = &self.config.radio;
        let mut devices = vec![("RX", self.link.rx)];
        if self.link.distinct() {
            devices.push(("TX", self.link.tx));
        }

        for (role, endpoint) in &devices {
            let failed = |what: &str| configuration_failed(format!("{role} endpoint: {what}"));
            endpoint.reset().map_err(failed("reset"))?;
            endpoint.init().map_err(failed("init"))?;
            endpoint
                .set_sample_rate(radio.sample_rate_hz, radio.oversampling)
                .map_err(failed("set sample rate"))?;
        }

        for channel in 0..self.config.channels {
            self.configure_path("RX", self.link.rx, Direction::Rx, channel)?;
            if self.link.distinct() {
                self.configure_path("RX", self.link.rx, Direction::Tx, channel)?;
            }
            self.configure_path("TX", self.link.tx, Direction::Tx, channel)?;
            if self.link.distinct() {
                self.configure_path("TX", self.link.tx, Direction::Rx, channel)?;
            }
        }
        Ok(())
    }

    fn configure_path(
        &self,
        role: &str,
        endpoint: &dyn DeviceEndpoint,
        direction: Direction,
        channel: usize,
    ) -> Result<()> {
        let radio = &self.config.radio;
        let failed = |what: &str| {
            configuration_failed(format!(
                "{direction} path of {role} endpoint, channel {channel}: {what}"
            ))
        };
        let gain = match direction {
            Direction::Tx => radio.tx_gain_db,
            Direction::Rx => radio.rx_gain_db,
        };

        endpoint
            .enable_channel(direction, channel, true)
            .map_err(failed("enable channel"))?;
        endpoint
            .set_antenna(channel, direction, radio.antenna_port)
            .map_err(failed("set antenna"))?;
        endpoint
            .set_lo_frequency(channel, direction, radio.lo_frequency_hz)
            .map_err(failed("set LO frequency"))?;
        endpoint
            .set_lowpass_bandwidth(channel, direction, radio.lowpass_bandwidth_hz)
            .map_err(failed("set low-pass bandwidth"))?;
        endpoint
            .set_gain_db(channel, direction, gain)
            .map_err(failed("set gain"))?;
        if radio.calibrate {
            endpoint
                .calibrate(direction, channel, radio.lowpass_bandwidth_hz)
                .map_err(failed("calibrate"))?;
        }
        Ok(())
    }

    fn create_streams(&mut self) -> Result<()> {
        for channel in 0..self.config.channels {
            let rx = self
                .link
                .rx
                .setup_stream(&self.descriptor(Direction::Rx, channel))
                .map_err(configuration_failed(format!(
                    "RX stream setup, channel {channel}"
                )))?;
            self.link.rx_streams.push(rx);

            let tx = self
                .link
                .tx
                .setup_stream(&self.descriptor(Direction::Tx, channel))
                .map_err(configuration_failed(format!(
                    "TX stream setup, channel {channel}"
                )))?;
            self.link.tx_streams.push(tx);
        }
        Ok(())
    }

    fn descriptor(&self, direction: Direction, channel: usize) -> StreamDescriptor {
        let fifo_size = match direction {
            Direction::Tx => self.config.tx_fifo_size,
            Direction::Rx => self.config.rx_fifo_size,
        };
        StreamDescriptor {
            channel,
            direction,
            fifo_size,
            throughput_vs_latency: self.config.throughput_vs_latency,
            format: SampleFormat::I16,
        }
    }

    /// Modulate `source`, start streaming and run until quit or stop.
    ///
    /// Pause-mode commands are read from `console`. Streams are stopped and
    /// destroyed and the sink finished before this returns, whatever the outcome.
    pub fn run(
        &mut self,
        source: &mut dyn SourceData,
        sink: &mut dyn SampleSink,
        console: &mut Console,
    ) -> Result<SessionSummary> {
        self.require(SessionState::Ready)?;
        if !self.configured {
            return Err(IqLinkError::InvalidState {
                expected: "ready".to_string(),
                actual: "ready after failed configuration".to_string(),
            });
        }

        let result = self.stream(source, sink, console);

        self.state = SessionState::Stopping;
        let released = self.link.release();
        let finished = sink.finish();
        self.state = SessionState::Stopped;

        let summary = result?;
        released?;
        finished?;
        if !self.config.quiet {
            eprintln!(
                "iqlink: session stopped after {} cycle(s), {} pause(s)",
                summary.cycles, summary.pauses
            );
        }
        Ok(summary)
    }

    fn stream(
        &mut self,
        source: &mut dyn SourceData,
        sink: &mut dyn SampleSink,
        console: &mut Console,
    ) -> Result<SessionSummary> {
        let mut live = self.prepare(source)?;
        sink.record(&ResultRecord::Started {
            scheme: live.tx_modulation.name().to_string(),
            source_bytes: source_len(source)?,
            tx_size: live.tx_size,
            maximum_buffer_size: live.maximum_buffer_size,
            continuous: self.config.continuous,
        })?;

        self.link.start_all()?;
        self.state = SessionState::Running;

        let signal = PauseSignal::new();
        if !self.config.continuous {
            signal.request_send();
        }
        let (mut cancel, cancel_rx) = WatcherCancel::new();
        let lines = console.lines();
        let rx_endpoint = self.link.rx;
        let quiet = self.config.quiet;

        thread::scope(|scope| {
            scope.spawn(|| watch_input(&lines, &signal, rx_endpoint, &cancel_rx, quiet));
            let outcome = self.cycle(&signal, &mut live, source, sink, console);
            cancel.cancel();
            outcome
        })
    }

    /// Size both buffers and modulate the initial burst.
    fn prepare(&self, source: &mut dyn SourceData) -> Result<LiveState> {
        let modulation = self.config.modulation;
        let pipeline = ModulationPipeline::new(self.config.continuous);
        let len = source_len(source)?;
        let plan = BufferPlan::new(len, modulation.bits_per_symbol(), self.config.continuous)?;

        let mut live = LiveState {
            tx: SymbolBuffer::new(plan.maximum_buffer_size),
            rx: SymbolBuffer::new(plan.maximum_buffer_size),
            tx_size: plan.tx_size,
            rx_size: plan.tx_size,
            maximum_buffer_size: plan.maximum_buffer_size,
            tx_modulation: modulation,
            rx_modulation: modulation,
            pipeline,
        };

        let fill = pipeline.fill(&modulation, source, &mut live.tx, live.tx_size)?;
        if fill.truncated && !self.config.quiet {
            eprintln!("iqlink: modulation buffer too small, data may be incomplete");
        }
        if fill.symbols() != live.tx_size {
            if !self.config.quiet && self.config.verbosity >= 1 {
                eprintln!(
                    "iqlink: resized TX burst from {} to {} symbols",
                    live.tx_size,
                    fill.symbols()
                );
            }
            live.tx_size = fill.symbols();
        }
        live.rx_size = live.tx_size;

        if !self.config.quiet {
            eprintln!(
                "iqlink: {} bytes as {}, {} symbols per burst{}",
                len,
                modulation,
                live.tx_size,
                if self.config.continuous {
                    " (continuous)"
                } else {
                    ""
                }
            );
        }
        Ok(live)
    }

    fn cycle(
        &mut self,
        signal: &PauseSignal,
        live: &mut LiveState,
        source: &mut dyn SourceData,
        sink: &mut dyn SampleSink,
        console: &mut Console,
    ) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();

        while !self.stop.is_stopped() {
            if signal.take_send() || self.config.continuous {
                self.send_all(live, &mut summary);
            }
            self.receive_all(live, sink, &mut summary);
            summary.cycles += 1;

            if signal.is_paused() {
                summary.pauses += 1;
                let outcome = self.pause(summary.pauses, live, source, sink, console)?;
                if outcome == PauseOutcome::Quit {
                    break;
                }
                self.state = SessionState::Running;
                signal.resume();
            }
        }

        let finished = ResultRecord::Finished {
            cycles: summary.cycles,
            pauses: summary.pauses,
            sent_symbols: summary.sent_symbols,
            received_symbols: summary.received_symbols,
            received_bytes: summary.received_bytes,
        };
        if let Err(e) = sink.record(&finished) {
            self.report_io("writing results", &e);
        }
        Ok(summary)
    }

    fn send_all(&self, live: &LiveState, summary: &mut SessionSummary) {
        if live.tx_size == 0 {
            return;
        }
        let frame = live.tx.samples();
        for handle in &self.link.tx_streams {
            match self.link.tx.send(*handle, frame, self.config.io_timeout_ms) {
                Ok(symbols) => summary.sent_symbols += symbols as u64,
                Err(e) => self.report_io("send", &e),
            }
        }
    }

    fn receive_all(
        &self,
        live: &mut LiveState,
        sink: &mut dyn SampleSink,
        summary: &mut SessionSummary,
    ) {
        if live.rx_size == 0 {
            return;
        }
        for (channel, handle) in self.link.rx_streams.iter().enumerate() {
            let received = self.link.rx.receive(
                *handle,
                live.rx.storage_mut(),
                live.rx_size,
                self.config.io_timeout_ms,
            );
            match received {
                Ok(symbols) => {
                    live.rx.set_filled(symbols);
                    let payload = demodulate_bytes(&live.rx_modulation, live.rx.samples());
                    if let Err(e) = sink.handle(channel, live.rx.samples(), &payload) {
                        self.report_io("writing received data", &e);
                    }
                    summary.received_symbols += symbols as u64;
                    summary.received_bytes += payload.len() as u64;
                }
                Err(e) => self.report_io("receive", &e),
            }
        }
    }

    fn report_io(&self, operation: &str, error: &IqLinkError) {
        if self.config.quiet {
            return;
        }
        // Timeouts are empty cycles
        if !error.is_timeout() || self.config.verbosity >= 2 {
            eprintln!("iqlink: {operation} failed: {error}");
        }
    }

    /// Stop streams, snapshot status, serve pause commands, then restart on resume.
    fn pause(
        &mut self,
        pause: u32,
        live: &mut LiveState,
        source: &mut dyn SourceData,
        sink: &mut dyn SampleSink,
        console: &mut Console,
    ) -> Result<PauseOutcome> {
        self.state = SessionState::Paused;
        if let Err(e) = self.link.stop_all() {
            console.say(format!("Stopping streams failed: {e}"));
        }

        let channels = match self.link.status() {
            Ok(channels) => channels,
            Err(e) => {
                console.say(format!("Reading stream status failed: {e}"));
                Vec::new()
            }
        };
        let paused = ResultRecord::Paused {
            pause,
            channels: channels.clone(),
        };
        if let Err(e) = sink.record(&paused) {
            console.say(format!("Writing results failed: {e}"));
        }
        if !self.config.quiet && self.config.verbosity >= 1 {
            eprintln!("iqlink: pause {pause}, {} channel(s) stopped", channels.len());
        }

        let mut context = PauseContext {
            link: &self.link,
            live,
            source,
            sink,
        };
        let outcome = ControlPlane::new(console).run(&mut context, &channels);

        if outcome == PauseOutcome::Resume
            && let Err(e) = self.link.start_all()
        {
            console.say(format!("Restarting streams failed: {e}"));
        }
        Ok(outcome)
    }
}

impl Drop for StreamSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.link.release()
            && !self.config.quiet
        {
            eprintln!("iqlink: releasing streams failed: {e}");
        }
    }
}

fn configuration_failed(step: String) -> impl FnOnce(IqLinkError) -> IqLinkError {
    move |e| IqLinkError::ConfigurationFailed {
        step,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockEndpoint;
    use std::sync::Arc;

    fn roster(mocks: &[Arc<MockEndpoint>]) -> Vec<Arc<dyn DeviceEndpoint>> {
        mocks
            .iter()
            .map(|mock| Arc::clone(mock) as Arc<dyn DeviceEndpoint>)
            .collect()
    }

    fn quiet_config(channels: usize) -> SessionConfig {
        SessionConfig {
            channels,
            ..SessionConfig::default()
        }
        .with_quiet(true)
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::Paused.to_string(), "paused");
        assert_eq!(SessionState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn session_config_from_file_config() {
        let mut config = Config::default();
        config.stream.modulation = "qpsk".to_string();
        config.stream.continuous = true;
        let session = SessionConfig::from_config(&config).unwrap();
        assert_eq!(session.modulation, Modulation::qpsk());
        assert!(session.continuous);
        assert_eq!(session.channels, defaults::NUM_CHANNELS);
    }

    #[test]
    fn session_config_rejects_unknown_modulation() {
        let mut config = Config::default();
        config.stream.modulation = "qam64".to_string();
        assert!(matches!(
            SessionConfig::from_config(&config),
            Err(IqLinkError::UnknownModulation { .. })
        ));
    }

    #[test]
    fn unknown_ids_fail_construction() {
        let mocks = [Arc::new(MockEndpoint::new(1))];
        let roster = roster(&mocks);

        let err = StreamSession::new(&roster, 9, 1, quiet_config(1)).err();
        assert!(matches!(
            err,
            Some(IqLinkError::EndpointNotFound { ref role, id: 9 }) if role == "TX"
        ));
        let err = StreamSession::new(&roster, 1, 4, quiet_config(1)).err();
        assert!(matches!(
            err,
            Some(IqLinkError::EndpointNotFound { ref role, id: 4 }) if role == "RX"
        ));
    }

    #[test]
    fn same_endpoint_configures_both_paths_once() {
        let mock = Arc::new(MockEndpoint::new(1));
        let roster = roster(&[Arc::clone(&mock)]);
        let mut session = StreamSession::new(&roster, 1, 1, quiet_config(1)).unwrap();
        assert_eq!(session.state(), SessionState::Configuring);

        session.configure().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(!session.link().distinct());

        let calls = mock.calls();
        assert_eq!(calls[0], "reset");
        assert_eq!(calls[1], "init");
        assert_eq!(mock.calls_named("reset").len(), 1);
        assert_eq!(
            mock.calls_named("enable_channel"),
            vec!["enable_channel(RX, 0, true)", "enable_channel(TX, 0, true)"]
        );
        assert_eq!(
            mock.calls_named("setup_stream"),
            vec!["setup_stream(RX, 0) -> #1", "setup_stream(TX, 0) -> #2"]
        );
    }

    #[test]
    fn distinct_endpoints_configure_every_path() {
        let tx = Arc::new(MockEndpoint::new(1));
        let rx = Arc::new(MockEndpoint::new(2));
        let roster = roster(&[Arc::clone(&tx), Arc::clone(&rx)]);
        let mut session = StreamSession::new(&roster, 1, 2, quiet_config(2)).unwrap();
        session.configure().unwrap();

        for mock in [&tx, &rx] {
            assert_eq!(mock.calls_named("reset").len(), 1);
            assert_eq!(mock.calls_named("enable_channel").len(), 4);
            assert_eq!(mock.calls_named("set_gain_db").len(), 4);
        }
        // Streams only on the role each endpoint plays
        assert!(rx.streams().iter().all(|(_, d, _)| d.direction == Direction::Rx));
        assert!(tx.streams().iter().all(|(_, d, _)| d.direction == Direction::Tx));
        assert_eq!(rx.streams().len(), 2);
    }

    #[test]
    fn stream_descriptors_carry_fifo_sizes() {
        let mock = Arc::new(MockEndpoint::new(1));
        let roster = roster(&[Arc::clone(&mock)]);
        let mut session = StreamSession::new(&roster, 1, 1, quiet_config(1)).unwrap();
        session.configure().unwrap();

        let streams = mock.streams();
        let rx = &streams[0].1;
        let tx = &streams[1].1;
        assert_eq!(rx.fifo_size, defaults::RX_FIFO_SIZE);
        assert_eq!(tx.fifo_size, defaults::TX_FIFO_SIZE);
        assert_eq!(tx.throughput_vs_latency, 0.5);
        assert_eq!(tx.format, SampleFormat::I16);
    }

    #[test]
    fn failed_step_is_named() {
        let mock = Arc::new(
            MockEndpoint::new(1)
                .with_failure("set_gain_db")
                .with_error_message("out of range"),
        );
        let roster = roster(&[Arc::clone(&mock)]);
        let mut session = StreamSession::new(&roster, 1, 1, quiet_config(1)).unwrap();

        let err = session.configure().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Endpoint configuration failed at RX path of RX endpoint, channel 0: set gain: \
             Endpoint call set_gain_db failed: out of range"
        );
        assert_eq!(session.state(), SessionState::Ready);
        assert!(mock.streams().is_empty());
    }

    #[test]
    fn calibration_is_optional() {
        let mock = Arc::new(MockEndpoint::new(1));
        let roster = roster(&[Arc::clone(&mock)]);
        let mut config = quiet_config(1);
        config.radio.calibrate = true;
        let mut session = StreamSession::new(&roster, 1, 1, config).unwrap();
        session.configure().unwrap();
        assert_eq!(
            mock.calls_named("calibrate"),
            vec!["calibrate(RX, 0, 5000000)", "calibrate(TX, 0, 5000000)"]
        );
    }

    #[test]
    fn configure_twice_is_invalid_state() {
        let mock = Arc::new(MockEndpoint::new(1));
        let roster = roster(&[Arc::clone(&mock)]);
        let mut session = StreamSession::new(&roster, 1, 1, quiet_config(1)).unwrap();
        session.configure().unwrap();
        assert!(matches!(
            session.configure(),
            Err(IqLinkError::InvalidState { .. })
        ));
    }

    #[test]
    fn drop_releases_created_streams() {
        let mock = Arc::new(MockEndpoint::new(1));
        let roster = roster(&[Arc::clone(&mock)]);
        {
            let mut session = StreamSession::new(&roster, 1, 1, quiet_config(2)).unwrap();
            session.configure().unwrap();
        }
        assert_eq!(mock.calls_named("destroy_stream").len(), 4);
        assert!(mock.streams().is_empty());
    }
}
