//! diagnostics.rs
//! Link health counters shared by the receive and transmit units.
//!
//! - Per-kind frame counts live in a `DashMap` of atomics (no lock on the decode path)
//! - Failure counters are plain atomics
//! - Recent link events go into a bounded `ArrayQueue` ring; a full ring evicts
//!   the oldest event and bumps `dropped_events` instead of blocking the producer

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;
use log::warn;

use crate::link::codec::FrameKind;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    ChecksumMismatch {
        kind: FrameKind,
        expected: u16,
        received: u16,
    },
    GarbageDiscarded {
        bytes: usize,
    },
    SubscriberFailed {
        kind: FrameKind,
        reason: String,
    },
    ReadError(String),
    WriteError(String),
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub seq: u64,
    pub ts: Instant,
    pub event: LinkEvent,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub control_status: u64,
    pub gains_ack: u64,
    pub reset_ack: u64,
    pub checksum_failures: u64,
    pub bytes_discarded: u64,
    pub subscriber_failures: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    pub packets_sent: u64,
    pub dropped_events: u64,
}

impl DiagnosticsSnapshot {
    pub fn frames_total(&self) -> u64 {
        self.control_status + self.gains_ack + self.reset_ack
    }
}

pub struct LinkDiagnostics {
    frames: DashMap<FrameKind, AtomicU64>,
    checksum_failures: AtomicU64,
    bytes_discarded: AtomicU64,
    subscriber_failures: AtomicU64,
    read_errors: AtomicU64,
    write_errors: AtomicU64,
    packets_sent: AtomicU64,

    events: ArrayQueue<RecordedEvent>,
    dropped_events: AtomicU64,
    seq_counter: AtomicU64,
}

impl Default for LinkDiagnostics {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl LinkDiagnostics {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            frames: DashMap::new(),
            checksum_failures: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
            subscriber_failures: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            events: ArrayQueue::new(event_capacity.max(1)),
            dropped_events: AtomicU64::new(0),
            seq_counter: AtomicU64::new(1),
        }
    }

    fn push_event(&self, event: LinkEvent) {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);
        let raw = RecordedEvent {
            seq,
            ts: Instant::now(),
            event,
        };
        if self.events.force_push(raw).is_some() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_frame(&self, kind: FrameKind) {
        self.frames
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checksum_failure(&self, kind: FrameKind, expected: u16, received: u16) {
        self.checksum_failures.fetch_add(1, Ordering::Relaxed);
        self.push_event(LinkEvent::ChecksumMismatch {
            kind,
            expected,
            received,
        });
    }

    pub fn record_discard(&self, bytes: usize) {
        self.bytes_discarded
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.push_event(LinkEvent::GarbageDiscarded { bytes });
    }

    pub fn record_subscriber_failure(&self, kind: FrameKind, reason: impl Into<String>) {
        self.subscriber_failures.fetch_add(1, Ordering::Relaxed);
        self.push_event(LinkEvent::SubscriberFailed {
            kind,
            reason: reason.into(),
        });
    }

    pub fn record_read_error(&self, msg: impl Into<String>) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
        self.push_event(LinkEvent::ReadError(msg.into()));
    }

    pub fn record_write_error(&self, msg: impl Into<String>) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
        self.push_event(LinkEvent::WriteError(msg.into()));
    }

    pub fn record_packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames(&self, kind: FrameKind) -> u64 {
        self.frames
            .get(&kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            control_status: self.frames(FrameKind::ControlStatus),
            gains_ack: self.frames(FrameKind::GainsAck),
            reset_ack: self.frames(FrameKind::ResetAck),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }

    /// Take every queued event, oldest first.
    pub fn drain_events(&self) -> Vec<RecordedEvent> {
        let mut out = Vec::with_capacity(self.events.len());
        while let Some(ev) = self.events.pop() {
            out.push(ev);
        }
        out
    }

    /// Drain the ring into the log. Returns how many events were written.
    pub fn log_recent_events(&self) -> usize {
        let events = self.drain_events();
        let now = Instant::now();
        for ev in &events {
            warn!(
                "[LinkDiagnostics] #{} ({} ms ago) {:?}",
                ev.seq,
                now.saturating_duration_since(ev.ts).as_millis(),
                ev.event
            );
        }
        events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_per_kind() {
        let d = LinkDiagnostics::default();
        d.record_frame(FrameKind::ControlStatus);
        d.record_frame(FrameKind::ControlStatus);
        d.record_frame(FrameKind::ResetAck);
        let s = d.snapshot();
        assert_eq!(s.control_status, 2);
        assert_eq!(s.gains_ack, 0);
        assert_eq!(s.reset_ack, 1);
        assert_eq!(s.frames_total(), 3);
    }

    #[test]
    fn events_are_ordered_and_drained() {
        let d = LinkDiagnostics::default();
        d.record_discard(7);
        d.record_checksum_failure(FrameKind::GainsAck, 10, 11);
        let events = d.drain_events();
        assert_eq!(events.len(), 2);
        assert!(events[0].seq < events[1].seq);
        assert_eq!(events[0].event, LinkEvent::GarbageDiscarded { bytes: 7 });
        assert!(d.drain_events().is_empty());

        let s = d.snapshot();
        assert_eq!(s.bytes_discarded, 7);
        assert_eq!(s.checksum_failures, 1);
    }

    #[test]
    fn full_ring_evicts_oldest() {
        let d = LinkDiagnostics::new(2);
        for _ in 0..5 {
            d.record_read_error("timeout storm");
        }
        let s = d.snapshot();
        assert_eq!(s.read_errors, 5);
        assert_eq!(s.dropped_events, 3);
        assert_eq!(d.drain_events().len(), 2);
    }

    #[test]
    fn newest_events_survive_overflow() {
        let d = LinkDiagnostics::new(2);
        for bytes in 1..=3 {
            d.record_discard(bytes);
        }
        let kept: Vec<LinkEvent> = d.drain_events().into_iter().map(|e| e.event).collect();
        assert_eq!(
            kept,
            vec![
                LinkEvent::GarbageDiscarded { bytes: 2 },
                LinkEvent::GarbageDiscarded { bytes: 3 },
            ]
        );
        assert_eq!(d.snapshot().dropped_events, 1);
    }

    #[test]
    fn logging_empties_the_ring() {
        let d = LinkDiagnostics::default();
        d.record_write_error("port gone");
        d.record_subscriber_failure(FrameKind::ControlStatus, "disk full");
        assert_eq!(d.log_recent_events(), 2);
        assert_eq!(d.log_recent_events(), 0);
    }
}
