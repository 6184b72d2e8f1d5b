//! dispatcher.rs
//! Routes decoded packets to subscribers, one trait per packet kind.
//!
//! - Called synchronously on the decode thread, subscribers run in registration order
//! - A subscriber returning `Err` or panicking is logged and counted; the
//!   remaining subscribers still get the value
//! - Each subscriber gets its own copy of the value

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use log::{error, warn};

use crate::error::Result;
use crate::link::codec::{FrameKind, Gains, Packet, Sample};
use crate::utils::diagnostics::LinkDiagnostics;

pub trait StatusSubscriber: Send {
    fn on_status(&mut self, sample: Sample) -> Result<()>;
}

pub trait GainsAckSubscriber: Send {
    fn on_gains_ack(&mut self, gains: Gains) -> Result<()>;
}

pub trait ResetAckSubscriber: Send {
    fn on_reset_ack(&mut self, status: u8) -> Result<()>;
}

impl<F> StatusSubscriber for F
where
    F: FnMut(Sample) -> Result<()> + Send,
{
    fn on_status(&mut self, sample: Sample) -> Result<()> {
        self(sample)
    }
}

impl<F> GainsAckSubscriber for F
where
    F: FnMut(Gains) -> Result<()> + Send,
{
    fn on_gains_ack(&mut self, gains: Gains) -> Result<()> {
        self(gains)
    }
}

impl<F> ResetAckSubscriber for F
where
    F: FnMut(u8) -> Result<()> + Send,
{
    fn on_reset_ack(&mut self, status: u8) -> Result<()> {
        self(status)
    }
}

pub struct Dispatcher {
    status: Vec<Box<dyn StatusSubscriber>>,
    gains_ack: Vec<Box<dyn GainsAckSubscriber>>,
    reset_ack: Vec<Box<dyn ResetAckSubscriber>>,
    diagnostics: Arc<LinkDiagnostics>,
}

impl Dispatcher {
    pub fn new(diagnostics: Arc<LinkDiagnostics>) -> Self {
        Self {
            status: Vec::new(),
            gains_ack: Vec::new(),
            reset_ack: Vec::new(),
            diagnostics,
        }
    }

    pub fn subscribe_status(&mut self, sub: impl StatusSubscriber + 'static) {
        self.status.push(Box::new(sub));
    }

    pub fn subscribe_gains_ack(&mut self, sub: impl GainsAckSubscriber + 'static) {
        self.gains_ack.push(Box::new(sub));
    }

    pub fn subscribe_reset_ack(&mut self, sub: impl ResetAckSubscriber + 'static) {
        self.reset_ack.push(Box::new(sub));
    }

    pub fn subscriber_count(&self, kind: FrameKind) -> usize {
        match kind {
            FrameKind::ControlStatus => self.status.len(),
            FrameKind::GainsAck => self.gains_ack.len(),
            FrameKind::ResetAck => self.reset_ack.len(),
        }
    }

    /// Deliver one packet to every subscriber of its kind.
    pub fn publish(&mut self, packet: &Packet) {
        let kind = packet.kind();
        self.diagnostics.record_frame(kind);

        match *packet {
            Packet::ControlStatus(sample) => {
                for (i, sub) in self.status.iter_mut().enumerate() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| sub.on_status(sample)));
                    report(&self.diagnostics, kind, i, outcome);
                }
            }
            Packet::GainsAck(gains) => {
                for (i, sub) in self.gains_ack.iter_mut().enumerate() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| sub.on_gains_ack(gains)));
                    report(&self.diagnostics, kind, i, outcome);
                }
            }
            Packet::ResetAck(status) => {
                for (i, sub) in self.reset_ack.iter_mut().enumerate() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| sub.on_reset_ack(status)));
                    report(&self.diagnostics, kind, i, outcome);
                }
            }
        }
    }
}

fn report(
    diagnostics: &LinkDiagnostics,
    kind: FrameKind,
    index: usize,
    outcome: std::thread::Result<Result<()>>,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!("[Dispatcher] {} subscriber #{} failed: {}", kind.name(), index, e);
            diagnostics.record_subscriber_failure(kind, e.to_string());
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            error!("[Dispatcher] {} subscriber #{} panicked: {}", kind.name(), index, reason);
            diagnostics.record_subscriber_failure(kind, reason);
        }
    }
}
