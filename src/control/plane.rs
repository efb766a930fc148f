//! Pause-mode command interpreter.
//!
//! Streams are stopped while this runs, so endpoint calls made here never
//! race the session loop. Endpoint failures are reported on the console and
//! the pause carries on.

use super::console::Console;
use super::{ControlCommand, register};
use crate::buffer::SymbolBuffer;
use crate::defaults::{
    DECIMATION_REGISTER, FULL_SCALE, INTERPOLATION_REGISTER, MAC_BOTH_CHANNELS, MAC_REGISTER,
};
use crate::device::{Direction, DeviceEndpoint, SynthClock};
use crate::error::{IqLinkError, Result};
use crate::modulation::{Iq, Modulation};
use crate::modulation::pipeline::SourceData;
use crate::output;
use crate::session::sink::{ChannelStatus, ResultRecord, SampleSink};
use crate::session::{Link, LiveState};
use std::f64::consts::PI;

/// How a pause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Resume,
    Quit,
}

/// Everything a pause command may read or change.
pub struct PauseContext<'p, 'a> {
    pub link: &'p Link<'a>,
    pub live: &'p mut LiveState,
    pub source: &'p mut dyn SourceData,
    pub sink: &'p mut dyn SampleSink,
}

/// Reads commands from a [`Console`] and applies them until continue or quit.
pub struct ControlPlane<'c> {
    console: &'c mut Console,
}

impl<'c> ControlPlane<'c> {
    pub fn new(console: &'c mut Console) -> Self {
        Self { console }
    }

    /// Print the pause snapshot, then serve commands.
    ///
    /// Closed input counts as quit.
    pub fn run(&mut self, context: &mut PauseContext<'_, '_>, snapshot: &[ChannelStatus]) -> PauseOutcome {
        self.print_status(snapshot);
        self.console
            .say("Halt stream confirmed. Ready for integer commands.");

        loop {
            let Some(command) = ControlCommand::read(self.console) else {
                return PauseOutcome::Quit;
            };
            self.console.discard_pending();
            if let Some(outcome) = self.execute(&command, context) {
                return outcome;
            }
        }
    }

    /// Apply one command. Returns an outcome when it ends the pause.
    pub fn execute(
        &mut self,
        command: &ControlCommand,
        context: &mut PauseContext<'_, '_>,
    ) -> Option<PauseOutcome> {
        if command.is_no_op() {
            return None;
        }
        let link = context.link;

        match command {
            ControlCommand::Continue => return Some(PauseOutcome::Resume),
            ControlCommand::Quit => return Some(PauseOutcome::Quit),
            ControlCommand::NewDestination => {
                let scheme = context.live.tx_modulation.name();
                if let Err(e) = context.sink.rotate(scheme) {
                    self.console.say(format!("New destination files failed: {e}"));
                }
            }
            ControlCommand::ChangeModulation { id } => self.change_modulation(*id, context),
            ControlCommand::PrintTx => {
                let listing = output::buffer_listing(&context.live.tx, context.live.tx_size);
                self.console.say(listing.trim_end());
            }
            ControlCommand::PrintRx => {
                let listing = output::buffer_listing(&context.live.rx, context.live.rx_size);
                self.console.say(listing.trim_end());
            }
            ControlCommand::PrintStatus => match link.status() {
                Ok(snapshot) => self.print_status(&snapshot),
                Err(e) => self.console.say(format!("Reading stream status failed: {e}")),
            },
            ControlCommand::PrintEndpointInfo => {
                self.console.say("TX:");
                self.console.say(link.tx.describe());
                if link.distinct() {
                    self.console.say("RX:");
                    self.console.say(link.rx.describe());
                }
            }
            ControlCommand::DumpTx => {
                self.dump("tx", &context.live.tx, context.live.tx_size, context.sink)
            }
            ControlCommand::DumpRx => {
                self.dump("rx", &context.live.rx, context.live.rx_size, context.sink)
            }
            ControlCommand::SetLowpassBandwidth { mhz } => {
                let hz = mhz * 1e6;
                self.for_each_path(link, "set low-pass bandwidth", |endpoint, channel| {
                    for direction in Direction::both() {
                        endpoint.set_lowpass_bandwidth(channel, direction, hz)?;
                    }
                    for direction in Direction::both() {
                        endpoint.calibrate(direction, channel, hz)?;
                    }
                    Ok(())
                });
            }
            ControlCommand::GetLowpassBandwidth => {
                self.show_paths(link, |endpoint, channel, direction| {
                    endpoint
                        .lowpass_bandwidth(channel, direction)
                        .map(output::mhz)
                });
            }
            ControlCommand::SetSampleRate { mhz, oversampling } => {
                let oversampling = u32::try_from(*oversampling).unwrap_or(u32::MAX);
                for (role, endpoint) in link.targets() {
                    if let Err(e) = endpoint.set_sample_rate(mhz * 1e6, oversampling) {
                        self.report(role, "set sample rate", &e);
                    }
                }
            }
            ControlCommand::GetSampleRate => {
                for (role, endpoint) in link.targets() {
                    self.console.say(format!("{role}:"));
                    for direction in Direction::both() {
                        match endpoint.sample_rate(direction) {
                            Ok(rate) => self.console.say(format!(
                                "{direction}: host {} | RF {}",
                                output::mhz(rate.host_hz),
                                output::mhz(rate.rf_hz)
                            )),
                            Err(e) => self.report(role, "get sample rate", &e),
                        }
                    }
                }
            }
            ControlCommand::SetGain { db, is_tx } => {
                let db = u32::try_from(*db).unwrap_or(u32::MAX);
                let direction = Direction::from_is_tx(*is_tx);
                self.for_each_path(link, "set gain", |endpoint, channel| {
                    endpoint.set_gain_db(channel, direction, db)
                });
            }
            ControlCommand::GetGain => {
                self.show_paths(link, |endpoint, channel, direction| {
                    endpoint
                        .gain_db(channel, direction)
                        .map(|db| format!("{db} dB"))
                });
            }
            ControlCommand::SetSynthClock { clock, mhz } => {
                let Some(clock) = self.clock(*clock) else {
                    return None;
                };
                for (role, endpoint) in link.targets() {
                    if let Err(e) = endpoint.set_synth_clock(clock, mhz * 1e6) {
                        self.report(role, "set clock", &e);
                    }
                }
            }
            ControlCommand::GetSynthClock => {
                for (role, endpoint) in link.targets() {
                    self.console.say(format!("{role}:"));
                    for clock in SynthClock::all() {
                        match endpoint.synth_clock(clock) {
                            Ok(hz) => self.console.say(format!("{clock}: {}", output::mhz(hz))),
                            Err(e) => self.report(role, "get clock", &e),
                        }
                    }
                }
            }
            ControlCommand::TuneClock { clock } => {
                let Some(clock) = self.clock(*clock) else {
                    return None;
                };
                for (role, endpoint) in link.targets() {
                    if let Err(e) = endpoint.tune_clock(clock) {
                        self.report(role, "tune clock", &e);
                    }
                }
            }
            ControlCommand::SetLoFrequency { hz, is_tx } => {
                let direction = Direction::from_is_tx(*is_tx);
                self.for_each_path(link, "set LO frequency", |endpoint, channel| {
                    endpoint.set_lo_frequency(channel, direction, *hz)
                });
            }
            ControlCommand::GetLoFrequency => {
                self.show_paths(link, |endpoint, channel, direction| {
                    endpoint.lo_frequency(channel, direction).map(output::mhz)
                });
            }
            ControlCommand::SetAntenna { port, is_tx } => {
                let port = usize::try_from(*port).unwrap_or(usize::MAX);
                let direction = Direction::from_is_tx(*is_tx);
                self.for_each_path(link, "set antenna", |endpoint, channel| {
                    endpoint.set_antenna(channel, direction, port)
                });
            }
            ControlCommand::GetAntenna => {
                self.show_paths(link, |endpoint, channel, direction| {
                    endpoint
                        .antenna(channel, direction)
                        .map(|port| format!("port {port}"))
                });
            }
            ControlCommand::SetGfirLowpass {
                is_tx,
                enabled,
                mhz,
            } => {
                let direction = Direction::from_is_tx(*is_tx);
                self.for_each_path(link, "set GFIR low-pass", |endpoint, channel| {
                    endpoint.set_gfir_lowpass(direction, channel, *enabled, mhz * 1e6)
                });
            }
            ControlCommand::SetInterpolationDecimation {
                interpolation,
                decimation,
            } => self.set_interpolation_decimation(link, *interpolation, *decimation),
            ControlCommand::TestTone { period } => {
                write_test_tone(context.live, *period);
            }
            ControlCommand::RegisterMode => register::run(self.console, link),
            ControlCommand::Help => self.console.say(output::command_help().trim_end()),
            ControlCommand::Unknown(token) => self
                .console
                .say(format!("Unknown command {token}, type help for a list")),
        }
        None
    }

    fn print_status(&mut self, snapshot: &[ChannelStatus]) {
        for status in snapshot {
            self.console
                .say(output::status_table(status.channel, &status.tx, &status.rx));
        }
    }

    fn report(&mut self, role: &str, action: &str, error: &IqLinkError) {
        self.console.say(format!("{role}: {action} failed: {error}"));
    }

    fn clock(&mut self, id: i64) -> Option<SynthClock> {
        let clock = SynthClock::from_id(id);
        if clock.is_none() {
            self.console
                .say(format!("Unknown clock {id}, use 1=SXR, 2=SXT or 3=CGEN"));
        }
        clock
    }

    /// Apply `apply` to every channel of TX and, when distinct, RX.
    /// A failing endpoint is reported and skipped.
    fn for_each_path(
        &mut self,
        link: &Link<'_>,
        action: &str,
        apply: impl Fn(&dyn DeviceEndpoint, usize) -> Result<()>,
    ) {
        for (role, endpoint) in link.targets() {
            for channel in 0..link.channels {
                if let Err(e) = apply(endpoint, channel) {
                    self.report(role, action, &e);
                    break;
                }
            }
        }
    }

    /// Print one value per channel and direction, grouped by endpoint.
    fn show_paths(
        &mut self,
        link: &Link<'_>,
        value: impl Fn(&dyn DeviceEndpoint, usize, Direction) -> Result<String>,
    ) {
        for (role, endpoint) in link.targets() {
            self.console.say(format!("{role}:"));
            for channel in 0..link.channels {
                for direction in Direction::both() {
                    match value(endpoint, channel, direction) {
                        Ok(text) => self
                            .console
                            .say(output::channel_value(&direction.to_string(), channel, text)),
                        Err(e) => self.report(role, "read", &e),
                    }
                }
            }
        }
    }

    fn dump(
        &mut self,
        label: &str,
        buffer: &SymbolBuffer,
        size: usize,
        sink: &mut dyn SampleSink,
    ) {
        match sink.dump(label, buffer) {
            Ok(Some(path)) => self
                .console
                .say(format!("{size} symbols written to {}", path.display())),
            Ok(None) => self.console.say(format!("{size} symbols")),
            Err(e) => self.console.say(format!("Dump failed: {e}")),
        }
    }

    /// Swap both schemes and re-modulate the unchanged source.
    ///
    /// The TX burst becomes whatever the pipeline produced, up to the
    /// maximum buffer size, and RX expects the same count.
    fn change_modulation(&mut self, id: i64, context: &mut PauseContext<'_, '_>) {
        let Some(modulation) = Modulation::from_id(id) else {
            self.console.say("Change TX constellation failed.");
            if context.link.distinct() {
                self.console.say("Change RX constellation failed.");
            }
            return;
        };

        let live = &mut *context.live;
        let fill = live.pipeline.fill(
            &modulation,
            context.source,
            &mut live.tx,
            live.maximum_buffer_size,
        );
        let fill = match fill {
            Ok(fill) => fill,
            Err(e) => {
                self.console.say(format!("Change TX constellation failed: {e}"));
                return;
            }
        };
        if fill.truncated {
            self.console
                .say("Modulation buffer too small, data may be incomplete");
        }

        live.tx_modulation = modulation;
        live.rx_modulation = modulation;
        live.tx_size = fill.symbols();
        live.rx_size = live.tx_size;

        if let Err(e) = context.sink.rotate(modulation.name()) {
            self.console.say(format!("New destination files failed: {e}"));
        }
        let record = ResultRecord::ModulationChanged {
            tx_scheme: live.tx_modulation.name().to_string(),
            rx_scheme: live.rx_modulation.name().to_string(),
            tx_size: live.tx_size,
        };
        if let Err(e) = context.sink.record(&record) {
            self.console.say(format!("Writing results failed: {e}"));
        }
        self.console.say(format!(
            "Modulation is now {modulation}, {} symbols per burst",
            live.tx_size
        ));
    }

    fn set_interpolation_decimation(&mut self, link: &Link<'_>, interpolation: i64, decimation: i64) {
        for (role, endpoint) in link.targets() {
            if let Err(e) = write_interpolation_decimation(endpoint, interpolation, decimation) {
                self.report(role, "set interpolation/decimation", &e);
                self.console.say("Failed.");
            }
        }
    }
}

fn write_interpolation_decimation(
    endpoint: &dyn DeviceEndpoint,
    interpolation: i64,
    decimation: i64,
) -> Result<()> {
    let field = |value: i64| {
        u16::try_from(value)
            .map_err(|_| IqLinkError::Other(format!("{value} is not a register value")))
    };
    let interpolation = field(interpolation)?;
    let decimation = field(decimation)?;
    endpoint.write_register(MAC_REGISTER, MAC_BOTH_CHANNELS)?;
    endpoint.write_register(INTERPOLATION_REGISTER, interpolation)?;
    endpoint.write_register(DECIMATION_REGISTER, decimation)
}

/// Overwrite the first `tx_size` TX symbols with a full-scale tone of `period` samples.
pub fn write_test_tone(live: &mut LiveState, period: i64) {
    if period == 0 {
        return;
    }
    let period = period as f64;
    let amplitude = f64::from(FULL_SCALE);
    for index in 0..live.tx_size {
        let phase = 2.0 * PI * index as f64 / period;
        live.tx.set(
            index,
            Iq::new(
                (phase.cos() * amplitude) as i16,
                (phase.sin() * amplitude) as i16,
            ),
        );
    }
}
