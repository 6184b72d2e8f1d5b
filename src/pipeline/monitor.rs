//! monitor.rs
//! Operator-facing facade over the decode pipeline and the command path.
//!
//! - `attach` registers the `on_*` callbacks with a `Dispatcher`; each callback
//!   fans out to live state, telemetry and both sinks
//! - Capture, recording, broadcast and rig commands are plain method calls
//! - Rig commands are queued for the transmit unit; nothing here touches the port

use std::{fmt, sync::Arc};

use log::{info, warn};
use parking_lot::Mutex;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::link::codec::{Gains, Sample};
use crate::link::transmitter::CommandQueue;
use crate::pipeline::{
    dispatcher::Dispatcher,
    log_sink::{LogSink, LogSinkStats},
    net_sink::{NetSink, NetSinkStats},
    state::{LiveSnapshot, LiveState},
    telemetry::{Telemetry, TelemetryReport},
};
use crate::utils::diagnostics::{DiagnosticsSnapshot, LinkDiagnostics};

/// Everything the status line prints.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub live: LiveSnapshot,
    pub link: DiagnosticsSnapshot,
    pub telemetry: TelemetryReport,
    pub recording: bool,
    pub log: LogSinkStats,
    pub net: NetSinkStats,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick={} deg={:8.3} cmX={:7.2} run={} gains(sent={} ack={}) rst_ack={} | \
             frames={} crc_err={} junk={}B | rec={} rows={} | udp={} sent={}",
            self.live.tick,
            self.live.angle,
            self.live.cm_x,
            self.live.running,
            self.live.gains_sent,
            self.live.gains_ack,
            self.live.reset_ack,
            self.link.frames_total(),
            self.link.checksum_failures,
            self.link.bytes_discarded,
            self.recording,
            self.log.rows_written,
            self.net.enabled,
            self.net.packets_sent,
        )?;
        if self.telemetry.capturing || self.telemetry.window_len > 0 {
            write!(
                f,
                " | fit a={:.4} b={:.4} n={}",
                self.telemetry.fit.slope, self.telemetry.fit.intercept, self.telemetry.window_len
            )?;
            match self.telemetry.rod_length {
                Some(l) => write!(f, " L_rod={:.3}m", l)?,
                None => write!(f, " L_rod=n/a")?,
            }
        }
        Ok(())
    }
}

pub struct Monitor {
    state: LiveState,
    telemetry: Mutex<Telemetry>,
    log_sink: LogSink,
    net_sink: NetSink,
    diagnostics: Arc<LinkDiagnostics>,
    commands: CommandQueue,
    gains: Mutex<Gains>,
}

impl Monitor {
    pub fn new(
        cfg: &AppConfig,
        commands: CommandQueue,
        diagnostics: Arc<LinkDiagnostics>,
    ) -> Result<Self> {
        Ok(Self {
            state: LiveState::default(),
            telemetry: Mutex::new(Telemetry::new(&cfg.telemetry)),
            log_sink: LogSink::start(&cfg.recording)?,
            net_sink: NetSink::new(&cfg.network)?,
            diagnostics,
            commands,
            gains: Mutex::new(cfg.gains),
        })
    }

    /// Register the inbound callbacks below with `dispatcher`.
    pub fn attach(self: &Arc<Self>, dispatcher: &mut Dispatcher) {
        let monitor = self.clone();
        dispatcher.subscribe_status(move |s: Sample| -> Result<()> {
            monitor.on_control_status(s);
            Ok(())
        });

        let monitor = self.clone();
        dispatcher.subscribe_gains_ack(move |g: Gains| -> Result<()> {
            monitor.on_gains_ack(g);
            Ok(())
        });

        let monitor = self.clone();
        dispatcher.subscribe_reset_ack(move |status: u8| -> Result<()> {
            monitor.on_reset_ack(status);
            Ok(())
        });
    }

    // ========================================================================
    // Inbound callbacks
    // ========================================================================

    /// Fan-out order: live state, telemetry history, CSV recorder, UDP broadcast.
    pub fn on_control_status(&self, sample: Sample) {
        self.state.apply_sample(&sample);
        self.telemetry.lock().record(sample);
        self.log_sink.submit(sample);
        self.net_sink.submit(&sample);
    }

    pub fn on_gains_ack(&self, gains: Gains) {
        info!(
            "[Monitor] gains confirmed: K_TH={:.1} K_X={:.2}",
            gains.k_th, gains.k_x
        );
        self.state.apply_gains_ack(gains);
    }

    pub fn on_reset_ack(&self, status: u8) {
        info!("[Monitor] reset confirmed by MCU (status={})", status);
        self.state.apply_reset_ack(status);
    }

    // ========================================================================
    // Capture window
    // ========================================================================

    pub fn start_capture(&self) {
        self.telemetry.lock().start();
        info!("[Monitor] capture started");
    }

    pub fn stop_capture(&self) {
        self.telemetry.lock().stop();
        info!("[Monitor] capture stopped");
    }

    pub fn reset_capture(&self) {
        self.telemetry.lock().reset();
        info!("[Monitor] capture reset");
    }

    /// Pull new samples into the window and refit.
    pub fn capture_tick(&self) -> TelemetryReport {
        let mut t = self.telemetry.lock();
        t.capture_tick();
        t.report()
    }

    // ========================================================================
    // Sinks
    // ========================================================================

    pub fn toggle_recording(&self) -> Result<bool> {
        self.log_sink.toggle_recording()
    }

    pub fn toggle_network_sink(&self) -> bool {
        self.net_sink.toggle()
    }

    // ========================================================================
    // Rig commands
    // ========================================================================

    pub fn gains(&self) -> Gains {
        *self.gains.lock()
    }

    /// Queue the gain set (three copies). Refused while the rig is running.
    pub fn apply_gains(&self, gains: Gains) -> Result<()> {
        if self.state.is_running() {
            warn!("[Monitor] cannot apply gains while running, stop first");
            return Err(Error::SystemRunning);
        }
        *self.gains.lock() = gains;
        self.commands.send_gains(gains)?;
        self.state.mark_gains_sent();
        info!("[Monitor] gains sent: {:?}", gains);
        Ok(())
    }

    pub fn start_system(&self) -> Result<()> {
        if !self.state.try_start() {
            warn!("[Monitor] apply gains before starting");
            return Err(Error::GainsNotApplied);
        }
        info!("[Monitor] system started");
        Ok(())
    }

    /// Stop and recentre locally, then queue the Reset packet. The local
    /// state changes even when the transmit unit is gone.
    pub fn send_reset(&self) -> Result<()> {
        self.state.mark_reset_sent();
        self.commands.send_reset()?;
        info!("[Monitor] reset sent, waiting for MCU ack");
        Ok(())
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn snapshot(&self) -> LiveSnapshot {
        self.state.snapshot()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            live: self.state.snapshot(),
            link: self.diagnostics.snapshot(),
            telemetry: self.telemetry.lock().report(),
            recording: self.log_sink.is_recording(),
            log: self.log_sink.stats(),
            net: self.net_sink.stats(),
        }
    }

    /// Close any recording session and stop the writer thread.
    pub fn shutdown(&self) {
        self.log_sink.shutdown();
    }
}
