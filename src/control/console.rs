//! Interactive line channel used while a session is paused.
//!
//! Lines arrive on a crossbeam channel fed by a stdin reader thread (or a
//! script in tests). Each line is split into whitespace tokens so a command
//! and its parameters can be typed on one line or answered prompt by prompt.

use crate::session::signal::StopHandle;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use std::collections::VecDeque;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How often a blocked read checks the stop handle.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Token reader and prompt writer for the control plane.
pub struct Console {
    lines: Receiver<String>,
    tokens: VecDeque<String>,
    out: Box<dyn Write + Send>,
    stop: Option<StopHandle>,
}

impl Console {
    pub fn new(lines: Receiver<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            lines,
            tokens: VecDeque::new(),
            out,
            stop: None,
        }
    }

    /// Console over stdin and stdout.
    pub fn stdio() -> io::Result<Self> {
        Ok(Self::new(spawn_stdin_reader()?, Box::new(io::stdout())))
    }

    /// Console fed by fixed lines, writing into a shared buffer.
    ///
    /// Input is closed after the last line.
    pub fn scripted(lines: &[&str]) -> (Self, SharedOutput) {
        let (tx, rx) = unbounded();
        for line in lines {
            // The receiver is alive, send cannot fail
            tx.send((*line).to_string()).ok();
        }
        drop(tx);
        let output = SharedOutput::default();
        (Self::new(rx, Box::new(output.clone())), output)
    }

    /// Give up blocked reads once `stop` is raised.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Another handle to the raw line channel.
    pub fn lines(&self) -> Receiver<String> {
        self.lines.clone()
    }

    /// Write without a newline and flush.
    pub fn prompt(&mut self, prompt: &str) {
        write!(self.out, "{prompt}").ok();
        self.out.flush().ok();
    }

    /// Write one line.
    pub fn say(&mut self, text: impl Display) {
        writeln!(self.out, "{text}").ok();
        self.out.flush().ok();
    }

    /// Next token, reading more lines as needed. `None` when input closed or stopped.
    pub fn next_token(&mut self) -> Option<String> {
        loop {
            if let Some(token) = self.tokens.pop_front() {
                return Some(token);
            }
            let line = self.next_line()?;
            self.tokens
                .extend(line.split_whitespace().map(str::to_string));
        }
    }

    /// Rest of the current line if tokens are queued, otherwise the next whole line.
    pub fn next_text(&mut self) -> Option<String> {
        if let Some(rest) = self.pending_text() {
            return Some(rest);
        }
        self.next_line().map(|line| line.trim().to_string())
    }

    /// Tokens still queued from the current line, rejoined.
    pub fn pending_text(&mut self) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }
        let rest: Vec<String> = self.tokens.drain(..).collect();
        Some(rest.join(" "))
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            match self.lines.recv_timeout(STOP_POLL) {
                Ok(line) => return Some(line),
                Err(RecvTimeoutError::Timeout) => {
                    if self.stop.as_ref().is_some_and(StopHandle::is_stopped) {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Drop tokens left over from the last command line.
    pub fn discard_pending(&mut self) {
        self.tokens.clear();
    }

    /// Prompt only when no token is already waiting.
    pub fn ask_token(&mut self, prompt: &str) -> Option<String> {
        if self.tokens.is_empty() {
            self.prompt(prompt);
        }
        self.next_token()
    }

    /// Integer parameter. Malformed input reads as 0.
    pub fn ask_int(&mut self, prompt: &str) -> Option<i64> {
        self.ask_token(prompt).map(|token| parse_int(&token))
    }

    /// Floating point parameter. Malformed input reads as 0.
    pub fn ask_float(&mut self, prompt: &str) -> Option<f64> {
        self.ask_token(prompt).map(|token| parse_float(&token))
    }

    /// Boolean parameter: non-zero numbers, `true`, `yes`, `y`, `tx` are true.
    pub fn ask_bool(&mut self, prompt: &str) -> Option<bool> {
        self.ask_token(prompt).map(|token| parse_bool(&token))
    }
}

/// Leading integer of `token`, like C `atoi`: `"12abc"` is 12, `"x"` is 0.
pub fn parse_int(token: &str) -> i64 {
    let token = token.trim();
    let (sign, digits) = match token.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, token.strip_prefix('+').unwrap_or(token)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |value| sign * value)
}

/// Float value of `token`, 0 when malformed or not finite.
pub fn parse_float(token: &str) -> f64 {
    token
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

pub fn parse_bool(token: &str) -> bool {
    match token.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "tx" => true,
        other => parse_int(other) != 0,
    }
}

/// Read stdin lines into a channel on a detached thread.
///
/// The thread ends when stdin closes or every receiver is gone.
pub fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("iqlink-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// In-memory writer whose contents can be read back after the console wrote to it.
#[derive(Debug, Clone, Default)]
pub struct SharedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedOutput {
    pub fn contents(&self) -> String {
        let buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoi_semantics() {
        assert_eq!(parse_int("42"), 42);
        assert_eq!(parse_int("-7"), -7);
        assert_eq!(parse_int("+3"), 3);
        assert_eq!(parse_int("12abc"), 12);
        assert_eq!(parse_int("5.9"), 5);
        assert_eq!(parse_int("abc"), 0);
        assert_eq!(parse_int(""), 0);
    }

    #[test]
    fn float_parsing_is_permissive() {
        assert_eq!(parse_float("2.5"), 2.5);
        assert_eq!(parse_float("1e6"), 1e6);
        assert_eq!(parse_float("fast"), 0.0);
        assert_eq!(parse_float("inf"), 0.0);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("TX"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("rx"));
        assert!(!parse_bool("no"));
    }

    #[test]
    fn tokens_span_lines_and_prompts_are_skipped_when_queued() {
        let (mut console, output) = Console::scripted(&["24 40", "1"]);
        assert_eq!(console.ask_token("paused=>").as_deref(), Some("24"));
        assert_eq!(console.ask_int("paused=>i24=>"), Some(40));
        assert_eq!(console.ask_bool("paused=>b24=>"), Some(true));
        assert_eq!(console.next_token(), None);
        // Only the bool had to be prompted for
        assert_eq!(output.contents(), "paused=>paused=>b24=>");
    }

    #[test]
    fn discard_drops_rest_of_line() {
        let (mut console, _output) = Console::scripted(&["15 extra words", "1"]);
        assert_eq!(console.next_token().as_deref(), Some("15"));
        console.discard_pending();
        assert_eq!(console.next_token().as_deref(), Some("1"));
    }

    #[test]
    fn next_text_takes_rest_of_line() {
        let (mut console, _output) = Console::scripted(&["3 G_LNA", "  MAC  "]);
        assert_eq!(console.next_token().as_deref(), Some("3"));
        assert_eq!(console.next_text().as_deref(), Some("G_LNA"));
        assert_eq!(console.next_text().as_deref(), Some("MAC"));
        assert_eq!(console.next_text(), None);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let (mut console, _output) = Console::scripted(&["", "   ", "2"]);
        assert_eq!(console.next_token().as_deref(), Some("2"));
    }

    #[test]
    fn stop_handle_ends_blocked_read() {
        let (_tx, rx) = unbounded::<String>();
        let stop = StopHandle::new();
        let mut console = Console::new(rx, Box::new(SharedOutput::default())).with_stop(stop.clone());
        stop.stop();
        assert_eq!(console.next_token(), None);
    }

    #[test]
    fn say_appends_newline() {
        let (mut console, output) = Console::scripted(&[]);
        console.say("Halt stream confirmed.");
        console.say(format_args!("{}:{}", 1, 2));
        assert_eq!(output.contents(), "Halt stream confirmed.\n1:2\n");
    }
}
