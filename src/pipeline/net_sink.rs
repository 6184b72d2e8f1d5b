//! net_sink.rs
//! Best-effort UDP forward of decoded samples.
//!
//! - Disabled: `submit` returns immediately
//! - Enabled: one 60-byte datagram per sample, sent on a non-blocking socket
//! - Send errors are counted and logged, never returned to the decode thread

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use log::{info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::link::codec::{Sample, encode_broadcast};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetSinkStats {
    pub enabled: bool,
    pub packets_sent: u64,
    pub send_errors: u64,
    pub target: SocketAddr,
}

pub struct NetSink {
    socket: Socket,
    target: SocketAddr,
    enabled: AtomicBool,
    packets_sent: AtomicU64,
    send_errors: AtomicU64,
    log_every: u64,
}

impl NetSink {
    pub fn new(cfg: &NetworkConfig) -> Result<Self> {
        let domain = if cfg.target.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        if cfg.target.is_ipv4() {
            socket.set_broadcast(true)?;
        }
        socket.set_nonblocking(true)?;

        info!("[NetSink] target {} (enabled={})", cfg.target, cfg.enabled);
        Ok(Self {
            socket,
            target: cfg.target,
            enabled: AtomicBool::new(cfg.enabled),
            packets_sent: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            log_every: cfg.log_every.max(1),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flip the enabled flag and return the new state.
    pub fn toggle(&self) -> bool {
        let now = !self.enabled.fetch_xor(true, Ordering::AcqRel);
        info!(
            "[NetSink] broadcasting {}",
            if now { "ENABLED" } else { "DISABLED" }
        );
        now
    }

    pub fn submit(&self, sample: &Sample) {
        if !self.is_enabled() {
            return;
        }
        let packet = encode_broadcast(sample);
        match self.socket.send_to(&packet, &SockAddr::from(self.target)) {
            Ok(_) => {
                let n = self.packets_sent.fetch_add(1, Ordering::Relaxed) + 1;
                if n % self.log_every == 0 {
                    info!("[NetSink] sent {} packets to {}", n, self.target);
                }
            }
            Err(e) => {
                self.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!("[NetSink] send to {} failed: {}", self.target, e);
            }
        }
    }

    pub fn stats(&self) -> NetSinkStats {
        NetSinkStats {
            enabled: self.is_enabled(),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            target: self.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::codec::decode_broadcast;
    use std::{net::UdpSocket, time::Duration};

    fn local_sink() -> (NetSink, UdpSocket) {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let cfg = NetworkConfig {
            target: rx.local_addr().unwrap(),
            enabled: false,
            log_every: 100,
        };
        (NetSink::new(&cfg).unwrap(), rx)
    }

    #[test]
    fn disabled_sink_sends_nothing() {
        let (sink, _rx) = local_sink();
        sink.submit(&Sample::default());
        assert_eq!(sink.stats().packets_sent, 0);
    }

    #[test]
    fn enabled_sink_forwards_sample() {
        let (sink, rx) = local_sink();
        assert!(sink.toggle());

        let sample = Sample {
            tick: 42,
            degree: 1.5,
            cm_x: -2.0,
            setspeed: 0.25,
            reserved: [9.0, 8.0, 7.0, 6.0, 5.0],
        };
        sink.submit(&sample);

        let mut buf = [0u8; 128];
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(n, 60);
        let (tick, values) = decode_broadcast(&buf[..n]).unwrap();
        assert_eq!(tick, 42);
        assert_eq!(values, [1.5, -2.0, 0.25, 9.0, 8.0, 7.0, 6.0]);
        assert_eq!(sink.stats().packets_sent, 1);

        assert!(!sink.toggle());
    }

    #[test]
    fn rejected_send_is_counted_not_raised() {
        let cfg = NetworkConfig {
            target: "127.0.0.1:0".parse().unwrap(),
            enabled: true,
            log_every: 100,
        };
        let sink = NetSink::new(&cfg).unwrap();
        sink.submit(&Sample::default());

        let stats = sink.stats();
        assert_eq!(stats.send_errors, 1);
        assert_eq!(stats.packets_sent, 0);
        assert!(stats.enabled);
    }
}
