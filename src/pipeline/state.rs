//! state.rs
//! Live rig state shared between the decode thread and the operator side.
//!
//! One mutex guards the whole group; it is held only for the field update,
//! never across I/O. Readers get a `LiveSnapshot` copy.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::link::codec::{Gains, Sample};

/// Cart position the rig returns to after a reset.
pub const X_CENTER_CM: f64 = 0.0;

/// An acknowledged gain set goes stale after this long.
pub const GAINS_ACK_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveSnapshot {
    pub tick: u32,
    pub cm_x: f64,
    pub angle: f64,
    pub setspeed: f64,
    pub samples: u64,
    pub running: bool,
    pub gains_sent: bool,
    pub gains_ack: bool,
    pub gains_ack_values: Option<Gains>,
    pub reset_ack: bool,
    pub reset_status: Option<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    view: LiveSnapshot,
    gains_ack_at: Option<Instant>,
}

#[derive(Debug)]
pub struct LiveState {
    inner: Mutex<Inner>,
    ack_ttl: Duration,
}

impl Default for LiveState {
    fn default() -> Self {
        Self::new(GAINS_ACK_TTL)
    }
}

impl LiveState {
    pub fn new(ack_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ack_ttl,
        }
    }

    pub fn apply_sample(&self, s: &Sample) {
        let mut g = self.inner.lock();
        g.view.tick = s.tick;
        g.view.cm_x = s.cm_x;
        g.view.angle = s.degree;
        g.view.setspeed = s.setspeed;
        g.view.samples += 1;
    }

    pub fn apply_gains_ack(&self, gains: Gains) {
        self.apply_gains_ack_at(gains, Instant::now());
    }

    fn apply_gains_ack_at(&self, gains: Gains, at: Instant) {
        let mut g = self.inner.lock();
        g.view.gains_ack = true;
        g.view.gains_ack_values = Some(gains);
        g.gains_ack_at = Some(at);
    }

    /// The MCU confirmed a reset: it is no longer balancing.
    pub fn apply_reset_ack(&self, status: u8) {
        let mut g = self.inner.lock();
        g.view.reset_ack = true;
        g.view.reset_status = Some(status);
        g.view.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().view.running
    }

    /// Gains went out: the previous ack no longer applies.
    pub fn mark_gains_sent(&self) {
        let mut g = self.inner.lock();
        g.view.gains_sent = true;
        g.view.gains_ack = false;
        g.gains_ack_at = None;
    }

    /// Set running if gains were sent; returns whether it did.
    pub fn try_start(&self) -> bool {
        let mut g = self.inner.lock();
        if !g.view.gains_sent {
            return false;
        }
        g.view.running = true;
        true
    }

    /// Reset was queued: stop, clear the old ack and recentre the cart.
    pub fn mark_reset_sent(&self) {
        let mut g = self.inner.lock();
        g.view.reset_ack = false;
        g.view.reset_status = None;
        g.view.running = false;
        g.view.cm_x = X_CENTER_CM;
        g.view.angle = 0.0;
    }

    /// Copy of the current state, expiring a stale gains ack first.
    pub fn snapshot(&self) -> LiveSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> LiveSnapshot {
        let mut g = self.inner.lock();
        if g.view.gains_sent && g.view.gains_ack {
            let stale = g
                .gains_ack_at
                .is_some_and(|at| now.saturating_duration_since(at) > self.ack_ttl);
            if stale {
                g.view.gains_sent = false;
                g.view.gains_ack = false;
                g.gains_ack_at = None;
            }
        }
        g.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_updates_position() {
        let st = LiveState::default();
        st.apply_sample(&Sample {
            tick: 7,
            degree: 3.5,
            cm_x: -1.25,
            ..Sample::default()
        });
        let s = st.snapshot();
        assert_eq!(s.tick, 7);
        assert_eq!(s.angle, 3.5);
        assert_eq!(s.cm_x, -1.25);
        assert_eq!(s.samples, 1);
    }

    #[test]
    fn start_requires_gains() {
        let st = LiveState::default();
        assert!(!st.try_start());
        st.mark_gains_sent();
        assert!(st.try_start());
        assert!(st.is_running());
    }

    #[test]
    fn gains_ack_expires() {
        let st = LiveState::new(Duration::from_secs(3));
        st.mark_gains_sent();
        let t0 = Instant::now();
        st.apply_gains_ack_at(Gains::default(), t0);

        let s = st.snapshot_at(t0 + Duration::from_secs(1));
        assert!(s.gains_sent && s.gains_ack);
        assert_eq!(s.gains_ack_values, Some(Gains::default()));

        let s = st.snapshot_at(t0 + Duration::from_secs(4));
        assert!(!s.gains_sent);
        assert!(!s.gains_ack);
        assert!(!st.try_start());
    }

    #[test]
    fn reset_recentres_and_stops() {
        let st = LiveState::default();
        st.mark_gains_sent();
        st.try_start();
        st.apply_sample(&Sample {
            cm_x: 12.0,
            degree: 5.0,
            ..Sample::default()
        });
        st.apply_reset_ack(1);
        assert!(!st.is_running());

        st.mark_reset_sent();
        let s = st.snapshot();
        assert_eq!(s.cm_x, X_CENTER_CM);
        assert_eq!(s.angle, 0.0);
        assert!(!s.reset_ack);
        assert!(!s.running);
    }
}
