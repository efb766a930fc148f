//! Pause-mode commands.
//!
//! Commands keep the numeric codes operators already know from the hardware
//! console and accept a word alias for each. Parameters follow the code on
//! the same line or are prompted for one at a time. Malformed numbers read
//! as 0, and a zero first parameter turns a mutating command into a no-op.

pub mod console;
pub mod plane;
pub mod register;

use crate::defaults::PAUSED_PROMPT;
use console::{Console, parse_int};

/// One command typed while paused.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Continue,
    Quit,
    NewDestination,
    ChangeModulation { id: i64 },
    PrintTx,
    PrintRx,
    PrintStatus,
    PrintEndpointInfo,
    DumpTx,
    DumpRx,
    SetLowpassBandwidth { mhz: f64 },
    GetLowpassBandwidth,
    SetSampleRate { mhz: f64, oversampling: i64 },
    GetSampleRate,
    SetGain { db: i64, is_tx: bool },
    GetGain,
    SetSynthClock { clock: i64, mhz: f64 },
    GetSynthClock,
    TuneClock { clock: i64 },
    SetLoFrequency { hz: f64, is_tx: bool },
    GetLoFrequency,
    SetAntenna { port: i64, is_tx: bool },
    GetAntenna,
    SetGfirLowpass { is_tx: bool, enabled: bool, mhz: f64 },
    SetInterpolationDecimation { interpolation: i64, decimation: i64 },
    TestTone { period: i64 },
    RegisterMode,
    Help,
    Unknown(String),
}

/// Code, alias and summary of every command, in code order.
pub const COMMANDS: &[(u16, &str, &str)] = &[
    (1, "continue", "resume streaming"),
    (2, "quit", "end the session"),
    (4, "new-dest", "start fresh results and destination files"),
    (5, "modulation", "change modulation <1=bpsk|2=qpsk>"),
    (10, "print-tx", "print the TX buffer"),
    (11, "print-rx", "print the RX buffer"),
    (15, "status", "print stream status"),
    (16, "info", "print endpoint information"),
    (18, "dump-tx", "write the TX buffer to a file"),
    (19, "dump-rx", "write the RX buffer to a file"),
    (20, "lpbw", "set low-pass bandwidth <MHz>"),
    (21, "get-lpbw", "print low-pass bandwidth"),
    (22, "rate", "set sample rate <MHz> <oversampling>"),
    (23, "get-rate", "print sample rate"),
    (24, "gain", "set gain <dB> <tx=1|rx=0>"),
    (25, "get-gain", "print gain"),
    (26, "clock", "set synthesiser clock <1=SXR|2=SXT|3=CGEN> <MHz>"),
    (27, "get-clock", "print synthesiser clocks"),
    (28, "tune", "retune clock <1=SXR|2=SXT|3=CGEN>"),
    (30, "lo", "set LO frequency <Hz> <tx=1|rx=0>"),
    (31, "get-lo", "print LO frequency"),
    (32, "antenna", "set antenna port <port> <tx=1|rx=0>"),
    (33, "get-antenna", "print antenna port"),
    (34, "gfir", "set GFIR low-pass <tx=1|rx=0> <enabled> <MHz>"),
    (36, "interp", "set interpolation and decimation"),
    (100, "tone", "replace the TX buffer with a test tone <period>"),
    (200, "spi", "register access mode"),
];

impl ControlCommand {
    /// Read one command and its parameters. `None` once input is exhausted.
    pub fn read(console: &mut Console) -> Option<Self> {
        let token = console.ask_token(PAUSED_PROMPT)?;
        let Some(code) = Self::code_of(&token) else {
            return Some(match token.to_ascii_lowercase().as_str() {
                "help" | "?" | "h" => ControlCommand::Help,
                _ => ControlCommand::Unknown(token),
            });
        };
        let prompt = |kind: char| format!("{PAUSED_PROMPT}{kind}{code}=>");

        let command = match code {
            1 => ControlCommand::Continue,
            2 => ControlCommand::Quit,
            4 => ControlCommand::NewDestination,
            5 => ControlCommand::ChangeModulation {
                id: console.ask_int(&prompt('i'))?,
            },
            10 => ControlCommand::PrintTx,
            11 => ControlCommand::PrintRx,
            15 => ControlCommand::PrintStatus,
            16 => ControlCommand::PrintEndpointInfo,
            18 => ControlCommand::DumpTx,
            19 => ControlCommand::DumpRx,
            20 => ControlCommand::SetLowpassBandwidth {
                mhz: console.ask_float(&prompt('f'))?,
            },
            21 => ControlCommand::GetLowpassBandwidth,
            22 => {
                let mhz = console.ask_float(&prompt('f'))?;
                let oversampling = console.ask_int(&prompt('i'))?;
                ControlCommand::SetSampleRate { mhz, oversampling }
            }
            23 => ControlCommand::GetSampleRate,
            24 => {
                let db = console.ask_int(&prompt('i'))?;
                let is_tx = db != 0 && console.ask_bool(&prompt('b'))?;
                ControlCommand::SetGain { db, is_tx }
            }
            25 => ControlCommand::GetGain,
            26 => {
                let clock = console.ask_int(&prompt('i'))?;
                let mhz = console.ask_float(&prompt('f'))?;
                ControlCommand::SetSynthClock { clock, mhz }
            }
            27 => ControlCommand::GetSynthClock,
            28 => ControlCommand::TuneClock {
                clock: console.ask_int(&prompt('i'))?,
            },
            30 => {
                let hz = console.ask_float(&prompt('f'))?;
                let is_tx = hz != 0.0 && console.ask_bool(&prompt('b'))?;
                ControlCommand::SetLoFrequency { hz, is_tx }
            }
            31 => ControlCommand::GetLoFrequency,
            32 => {
                let port = console.ask_int(&prompt('i'))?;
                let is_tx = port != 0 && console.ask_bool(&prompt('b'))?;
                ControlCommand::SetAntenna { port, is_tx }
            }
            33 => ControlCommand::GetAntenna,
            34 => {
                let is_tx = console.ask_bool(&prompt('i'))?;
                let enabled = console.ask_bool(&prompt('b'))?;
                let mhz = console.ask_float(&prompt('f'))?;
                ControlCommand::SetGfirLowpass {
                    is_tx,
                    enabled,
                    mhz,
                }
            }
            36 => {
                let interpolation =
                    console.ask_int(&format!("{PAUSED_PROMPT}i36=>Interpolation=>"))?;
                let decimation = console.ask_int(&format!("{PAUSED_PROMPT}i36=>Decimation=>"))?;
                ControlCommand::SetInterpolationDecimation {
                    interpolation,
                    decimation,
                }
            }
            100 => ControlCommand::TestTone {
                period: console.ask_int(&prompt('i'))?,
            },
            200 => ControlCommand::RegisterMode,
            _ => ControlCommand::Unknown(token),
        };
        Some(command)
    }

    /// Numeric code of a token: digits are parsed, aliases looked up.
    fn code_of(token: &str) -> Option<u16> {
        if token.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            return u16::try_from(parse_int(token)).ok().or(Some(0));
        }
        let token = token.to_ascii_lowercase();
        let alias = match token.as_str() {
            "resume" | "c" => "continue",
            "exit" | "q" => "quit",
            "registers" => "spi",
            other => other,
        };
        COMMANDS
            .iter()
            .find(|(_, name, _)| *name == alias)
            .map(|(code, _, _)| *code)
    }

    /// Mutating commands a zero parameter turns into a no-op.
    ///
    /// Gain, antenna port and oversampling cannot be negative, so those
    /// are skipped too rather than wrapped into an unsigned value.
    pub fn is_no_op(&self) -> bool {
        match self {
            ControlCommand::SetLowpassBandwidth { mhz } => *mhz == 0.0,
            ControlCommand::SetSampleRate { mhz, oversampling } => {
                *mhz == 0.0 || *oversampling <= 0
            }
            ControlCommand::SetGain { db, .. } => *db <= 0,
            ControlCommand::SetSynthClock { mhz, .. } => *mhz == 0.0,
            ControlCommand::SetLoFrequency { hz, .. } => *hz == 0.0,
            ControlCommand::SetAntenna { port, .. } => *port <= 0,
            ControlCommand::SetGfirLowpass { mhz, .. } => *mhz == 0.0,
            ControlCommand::TestTone { period } => *period == 0,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(lines: &[&str]) -> Vec<ControlCommand> {
        let (mut console, _output) = Console::scripted(lines);
        let mut commands = Vec::new();
        while let Some(command) = ControlCommand::read(&mut console) {
            console.discard_pending();
            commands.push(command);
        }
        commands
    }

    #[test]
    fn codes_and_aliases() {
        assert_eq!(
            read_all(&["1", "continue", "q", "15", "status", "help"]),
            vec![
                ControlCommand::Continue,
                ControlCommand::Continue,
                ControlCommand::Quit,
                ControlCommand::PrintStatus,
                ControlCommand::PrintStatus,
                ControlCommand::Help,
            ]
        );
    }

    #[test]
    fn parameters_on_same_line_or_prompted() {
        assert_eq!(
            read_all(&["24 40 1", "22", "2.5", "4"]),
            vec![
                ControlCommand::SetGain {
                    db: 40,
                    is_tx: true
                },
                ControlCommand::SetSampleRate {
                    mhz: 2.5,
                    oversampling: 4
                },
            ]
        );
    }

    #[test]
    fn prompts_name_kind_and_code() {
        let (mut console, output) = Console::scripted(&["20", "5", "36", "2", "1"]);
        ControlCommand::read(&mut console);
        ControlCommand::read(&mut console);
        assert_eq!(
            output.contents(),
            "paused=>paused=>f20=>paused=>paused=>i36=>Interpolation=>paused=>i36=>Decimation=>"
        );
    }

    #[test]
    fn zero_first_parameter_skips_direction_prompt() {
        let (mut console, output) = Console::scripted(&["24", "0", "15"]);
        assert_eq!(
            ControlCommand::read(&mut console),
            Some(ControlCommand::SetGain {
                db: 0,
                is_tx: false
            })
        );
        assert!(!output.contents().contains("b24"));
        assert_eq!(
            ControlCommand::read(&mut console),
            Some(ControlCommand::PrintStatus)
        );
    }

    #[test]
    fn malformed_numbers_read_as_zero() {
        let commands = read_all(&["20 fast", "100 x"]);
        assert_eq!(
            commands,
            vec![
                ControlCommand::SetLowpassBandwidth { mhz: 0.0 },
                ControlCommand::TestTone { period: 0 },
            ]
        );
        assert!(commands.iter().all(ControlCommand::is_no_op));
    }

    #[test]
    fn negative_gain_and_port_are_no_ops() {
        let negative = [
            ControlCommand::SetGain {
                db: -5,
                is_tx: true,
            },
            ControlCommand::SetAntenna {
                port: -1,
                is_tx: false,
            },
        ];
        assert!(negative.iter().all(ControlCommand::is_no_op));
        // Negative frequencies still reach the endpoint
        assert!(!ControlCommand::SetLoFrequency { hz: -1.0, is_tx: true }.is_no_op());
    }

    #[test]
    fn unknown_codes_and_words() {
        assert_eq!(
            read_all(&["99", "-3", "frobnicate"]),
            vec![
                ControlCommand::Unknown("99".to_string()),
                ControlCommand::Unknown("-3".to_string()),
                ControlCommand::Unknown("frobnicate".to_string()),
            ]
        );
    }

    #[test]
    fn missing_parameter_at_end_of_input() {
        assert_eq!(read_all(&["5"]), Vec::<ControlCommand>::new());
    }

    #[test]
    fn gfir_reads_three_parameters() {
        assert_eq!(
            read_all(&["34 1 0 2.5"]),
            vec![ControlCommand::SetGfirLowpass {
                is_tx: true,
                enabled: false,
                mhz: 2.5
            }]
        );
    }

    #[test]
    fn every_listed_code_parses() {
        for (code, alias, _) in COMMANDS {
            assert_eq!(ControlCommand::code_of(&code.to_string()), Some(*code));
            assert_eq!(ControlCommand::code_of(alias), Some(*code));
        }
    }
}
