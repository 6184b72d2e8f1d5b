//! transmitter.rs
//! Transmit unit: paced joystick stream plus queued one-shot commands.
//!
//! - Periodic release with `SpinSleeper` (default 50 Hz); the deadline advances by
//!   one period per tick and re-anchors when more than one period behind
//! - At most one queued command (SetGains / Reset) goes out per tick, ahead of
//!   the joystick packet
//! - The joystick sequence number wraps at 255
//! - Sole writer on the transport

use std::{
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, TryRecvError, unbounded};
use log::{debug, error, info};
use parking_lot::Mutex;
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::error::{Error, Result};
use crate::link::codec::{Command, Gains, JoystickState, encode_command};
use crate::utils::diagnostics::LinkDiagnostics;

/// SetGains is repeated this many times (seq 0, 1, 2).
pub const GAINS_REPEAT: u8 = 3;

pub type SharedJoystick = Arc<Mutex<JoystickState>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outgoing {
    pub command: Command,
    pub seq: u8,
}

/// Producer side handed to the operator/monitor.
#[derive(Clone)]
pub struct CommandQueue {
    tx: Sender<Outgoing>,
}

impl CommandQueue {
    pub fn push(&self, command: Command, seq: u8) -> Result<()> {
        self.tx
            .send(Outgoing { command, seq })
            .map_err(|_| Error::LinkClosed)
    }

    pub fn send_gains(&self, gains: Gains) -> Result<()> {
        for seq in 0..GAINS_REPEAT {
            self.push(Command::SetGains(gains), seq)?;
        }
        Ok(())
    }

    pub fn send_reset(&self) -> Result<()> {
        self.push(Command::Reset, 0)
    }

    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

pub fn command_channel() -> (CommandQueue, Receiver<Outgoing>) {
    let (tx, rx) = unbounded();
    (CommandQueue { tx }, rx)
}

pub struct Transmitter<W> {
    sink: W,
    commands: Receiver<Outgoing>,
    joystick: SharedJoystick,
    period: Duration,
    running: Arc<AtomicBool>,
    diagnostics: Arc<LinkDiagnostics>,
    seq: u8,
    commands_open: bool,
}

impl<W: Write> Transmitter<W> {
    pub fn new(
        sink: W,
        commands: Receiver<Outgoing>,
        joystick: SharedJoystick,
        period: Duration,
        running: Arc<AtomicBool>,
        diagnostics: Arc<LinkDiagnostics>,
    ) -> Self {
        Self {
            sink,
            commands,
            joystick,
            period,
            running,
            diagnostics,
            seq: 0,
            commands_open: true,
        }
    }

    fn write_packet(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all(bytes)?;
        self.sink.flush()?;
        self.diagnostics.record_packet_sent();
        Ok(())
    }

    /// One transmit cycle: at most one queued command, then the joystick packet.
    pub fn tick(&mut self) -> io::Result<()> {
        if self.commands_open {
            match self.commands.try_recv() {
                Ok(out) => {
                    debug!("[Transmitter] sending {:?} seq={}", out.command, out.seq);
                    let bytes = encode_command(&out.command, out.seq);
                    self.write_packet(&bytes)?;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.commands_open = false,
            }
        }

        let js = *self.joystick.lock();
        let bytes = encode_command(&Command::Joystick(js), self.seq);
        self.seq = self.seq.wrapping_add(1);
        self.write_packet(&bytes)
    }

    /// Paced loop until the running flag drops.
    pub fn run(&mut self) {
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_deadline = Instant::now() + self.period;

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            }

            if let Err(e) = self.tick() {
                error!("[Transmitter] write failed: {}", e);
                self.diagnostics.record_write_error(e.to_string());
            }

            next_deadline += self.period;
            let now = Instant::now();
            if now > next_deadline + self.period {
                // Fell behind by more than a period: drop the backlog.
                next_deadline = now + self.period;
            }
        }
        debug!("[Transmitter] stopped at seq={}", self.seq);
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }
}

pub fn spawn_transmitter<W>(mut tx: Transmitter<W>) -> Result<JoinHandle<()>>
where
    W: Write + Send + 'static,
{
    info!(
        "[Transmitter] starting at {:.1} Hz",
        1.0 / tx.period.as_secs_f64()
    );
    let handle = thread::Builder::new()
        .name("link-tx".into())
        .spawn(move || tx.run())?;
    Ok(handle)
}
