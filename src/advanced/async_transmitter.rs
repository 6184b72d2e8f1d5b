//! Async transmit path: tokio timer drives the packet schedule, a blocking
//! thread owns the serial writer.
//!
//! - `tokio::time::interval` with `MissedTickBehavior::Skip`: a late tick is
//!   dropped rather than bursting to catch up
//! - Same per-tick rule as the threaded unit: one queued command, then joystick
//! - Encoded packets cross to the writer thread over a bounded tokio mpsc;
//!   a full queue drops the packet and counts a write error

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, TryRecvError};
use log::{debug, error};
use tokio::{
    sync::mpsc,
    time::{self, Duration, MissedTickBehavior},
};

use crate::error::Result;
use crate::link::codec::{Command, encode_command};
use crate::link::transmitter::{Outgoing, SharedJoystick};
use crate::utils::diagnostics::LinkDiagnostics;

pub const OUTBOUND_CAPACITY: usize = 64;

fn enqueue(out: &mpsc::Sender<Vec<u8>>, bytes: Vec<u8>, diagnostics: &LinkDiagnostics) -> bool {
    match out.try_send(bytes) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            diagnostics.record_write_error("outbound queue full");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Timer-driven producer. Returns when `running` drops or the writer is gone.
pub async fn async_transmit_loop(
    commands: Receiver<Outgoing>,
    joystick: SharedJoystick,
    period: Duration,
    out: mpsc::Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
    diagnostics: Arc<LinkDiagnostics>,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq: u8 = 0;
    let mut commands_open = true;

    while running.load(Ordering::Relaxed) {
        interval.tick().await;

        if commands_open {
            match commands.try_recv() {
                Ok(cmd) => {
                    if !enqueue(&out, encode_command(&cmd.command, cmd.seq), &diagnostics) {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => commands_open = false,
            }
        }

        let js = *joystick.lock();
        if !enqueue(&out, encode_command(&Command::Joystick(js), seq), &diagnostics) {
            break;
        }
        seq = seq.wrapping_add(1);
    }
    debug!("[async_transmit] loop exited at seq={}", seq);
}

/// Blocking consumer: writes every packet to `sink` until the channel closes.
pub fn spawn_blocking_writer<W>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut sink: W,
    diagnostics: Arc<LinkDiagnostics>,
) -> Result<JoinHandle<()>>
where
    W: Write + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("link-tx-writer".into())
        .spawn(move || {
            while let Some(bytes) = rx.blocking_recv() {
                let res = sink.write_all(&bytes).and_then(|_| sink.flush());
                match res {
                    Ok(()) => diagnostics.record_packet_sent(),
                    Err(e) => {
                        error!("[async_transmit] write failed: {}", e);
                        diagnostics.record_write_error(e.to_string());
                    }
                }
            }
            debug!("[async_transmit] writer exiting");
        })?;
    Ok(handle)
}
