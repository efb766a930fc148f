//! Coordination between the session loop and the input watcher thread.
//!
//! The pause flag is an atomic. A pending one-shot send is a bounded queue of
//! one, so repeated requests collapse instead of racing. The watcher blocks on
//! a resume channel while the session is paused and is cancelled by dropping
//! the sender of its cancel channel.

use crate::device::DeviceEndpoint;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Requests an external stop (Ctrl-C) of a running session.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Pause flag, pending-send request and resume wakeup.
#[derive(Debug)]
pub struct PauseSignal {
    paused: AtomicBool,
    send_tx: Sender<()>,
    send_rx: Receiver<()>,
    resume_tx: Sender<()>,
    resume_rx: Receiver<()>,
}

impl Default for PauseSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseSignal {
    pub fn new() -> Self {
        let (send_tx, send_rx) = bounded(1);
        let (resume_tx, resume_rx) = bounded(1);
        Self {
            paused: AtomicBool::new(false),
            send_tx,
            send_rx,
            resume_tx,
            resume_rx,
        }
    }

    /// Ask the session loop to pause at the end of its current cycle.
    pub fn raise(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Queue one one-shot send. Returns false if one is already pending.
    pub fn request_send(&self) -> bool {
        self.send_tx.try_send(()).is_ok()
    }

    /// Consume the pending send request, if any.
    pub fn take_send(&self) -> bool {
        self.send_rx.try_recv().is_ok()
    }

    /// Clear the pause flag and wake the watcher.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        // A full channel already holds a wakeup
        self.resume_tx.try_send(()).ok();
    }

    /// Block until [`resume`](Self::resume) is called. Returns false when cancelled.
    pub fn wait_resume(&self, cancel: &Receiver<()>) -> bool {
        select! {
            recv(self.resume_rx) -> woke => woke.is_ok(),
            recv(cancel) -> _ => false,
        }
    }
}

/// Owning side of the watcher's cancel channel. Dropping it or calling
/// [`cancel`](Self::cancel) unblocks every receiver.
#[derive(Debug)]
pub struct WatcherCancel {
    tx: Option<Sender<()>>,
}

impl WatcherCancel {
    pub fn new() -> (Self, Receiver<()>) {
        let (tx, rx) = bounded(0);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn cancel(&mut self) {
        self.tx.take();
    }
}

/// Action requested by one line typed while the session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKey {
    /// `p` / `P`: disable AGC and pause.
    Pause,
    /// `s`: send the buffer once.
    Send,
    /// Leading digits: enable AGC targeting this RSSI.
    Agc(u32),
}

impl WatchKey {
    /// Classify by the first character; anything else is ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_start();
        let first = line.chars().next()?;
        match first {
            'p' | 'P' => Some(WatchKey::Pause),
            's' => Some(WatchKey::Send),
            c if c.is_ascii_digit() => {
                let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
                Some(WatchKey::Agc(digits.parse().unwrap_or(u32::MAX)))
            }
            _ => None,
        }
    }
}

/// Input watcher body: reacts to lines until cancelled or input closes.
///
/// After raising the pause it stops reading, leaving the input to the control
/// plane, and waits for the session to resume.
pub fn watch_input(
    lines: &Receiver<String>,
    signal: &PauseSignal,
    rx_endpoint: &dyn DeviceEndpoint,
    cancel: &Receiver<()>,
    quiet: bool,
) {
    loop {
        let line = select! {
            recv(lines) -> line => match line {
                Ok(line) => line,
                Err(_) => return,
            },
            recv(cancel) -> _ => return,
        };

        match WatchKey::parse(&line) {
            Some(WatchKey::Pause) => {
                if let Err(e) = rx_endpoint.set_agc(0, false)
                    && !quiet
                {
                    eprintln!("iqlink: could not disable AGC before pausing: {e}");
                }
                signal.raise();
                if !signal.wait_resume(cancel) {
                    return;
                }
            }
            Some(WatchKey::Send) => {
                signal.request_send();
            }
            Some(WatchKey::Agc(rssi)) => {
                if let Err(e) = rx_endpoint.set_agc(rssi, true)
                    && !quiet
                {
                    eprintln!("iqlink: could not enable AGC (RSSI {rssi}): {e}");
                }
            }
            None => {}
        }
    }
}
