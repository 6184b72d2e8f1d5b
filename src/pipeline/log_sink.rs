//! log_sink.rs
//! Asynchronous CSV recorder for decoded samples.
//!
//! - `submit` only pushes into an unbounded crossbeam channel: the decode thread never blocks
//! - A worker thread owns the open CSV writer and blocks on the channel when idle
//! - Session open/close travels through the same channel, so rows land in the
//!   session that was active when they were submitted
//! - While no session is open, rows are drained and dropped
//! - Flush every `flush_every` rows (50 by default, about 1 s at 50 Hz)

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use chrono::Local;
use crossbeam::channel::{Sender, unbounded};
use csv::{Writer, WriterBuilder};
use log::{debug, error, info};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::RecordingConfig;
use crate::error::{Error, Result};
use crate::link::codec::Sample;

pub const LOG_HEADER: [&str; 7] = [
    "logtick",
    "degree",
    "cmX",
    "setspeed",
    "reserved1",
    "reserved2",
    "reserved3",
];

#[derive(Debug, Serialize)]
struct LogRow {
    logtick: u32,
    degree: f64,
    #[serde(rename = "cmX")]
    cm_x: f64,
    setspeed: f64,
    reserved1: f64,
    reserved2: f64,
    reserved3: f64,
}

impl From<&Sample> for LogRow {
    fn from(s: &Sample) -> Self {
        Self {
            logtick: s.tick,
            degree: s.degree,
            cm_x: s.cm_x,
            setspeed: s.setspeed,
            reserved1: s.reserved[0],
            reserved2: s.reserved[1],
            reserved3: s.reserved[2],
        }
    }
}

enum LogMsg {
    Row(Sample),
    Open(Writer<File>, PathBuf),
    Close,
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    rows_written: AtomicU64,
    rows_dropped: AtomicU64,
    write_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogSinkStats {
    pub rows_written: u64,
    pub rows_dropped: u64,
    pub write_errors: u64,
}

#[derive(Debug, Default)]
struct RecorderState {
    recording: bool,
    path: Option<PathBuf>,
}

pub struct LogSink {
    tx: Sender<LogMsg>,
    log_dir: PathBuf,
    state: Mutex<RecorderState>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogSink {
    /// Spawn the writer thread. No session is open until `toggle_recording`.
    pub fn start(cfg: &RecordingConfig) -> Result<Self> {
        let (tx, rx) = unbounded::<LogMsg>();
        let counters = Arc::new(Counters::default());
        let flush_every = cfg.flush_every.max(1);

        let worker_counters = counters.clone();
        let handle = thread::Builder::new()
            .name("log-sink".into())
            .spawn(move || {
                let mut session: Option<(Writer<File>, PathBuf)> = None;
                let mut rows = 0usize;

                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMsg::Row(sample) => {
                            let Some((wtr, path)) = session.as_mut() else {
                                worker_counters.rows_dropped.fetch_add(1, Ordering::Relaxed);
                                continue;
                            };
                            if let Err(e) = wtr.serialize(LogRow::from(&sample)) {
                                worker_counters.write_errors.fetch_add(1, Ordering::Relaxed);
                                error!("[LogSink] write to {} failed: {}", path.display(), e);
                                continue;
                            }
                            worker_counters.rows_written.fetch_add(1, Ordering::Relaxed);
                            rows += 1;
                            if rows % flush_every == 0 {
                                if let Err(e) = wtr.flush() {
                                    error!("[LogSink] flush failed: {}", e);
                                }
                            }
                        }
                        LogMsg::Open(wtr, path) => {
                            close_session(session.take());
                            session = Some((wtr, path));
                            rows = 0;
                        }
                        LogMsg::Close => close_session(session.take()),
                        LogMsg::Shutdown => break,
                    }
                }
                close_session(session.take());
                debug!("[LogSink] worker exiting");
            })?;

        Ok(Self {
            tx,
            log_dir: cfg.log_dir.clone(),
            state: Mutex::new(RecorderState::default()),
            counters,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queue a sample. Never blocks.
    pub fn submit(&self, sample: Sample) {
        if self.tx.send(LogMsg::Row(sample)).is_err() {
            self.counters.rows_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.state.lock().path.clone()
    }

    /// Start a new session when off, close the current one when on.
    /// Returns the new recording state.
    pub fn toggle_recording(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.recording {
            self.tx.send(LogMsg::Close).map_err(|_| Error::LinkClosed)?;
            info!("[LogSink] recording stopped");
            state.recording = false;
            state.path = None;
            return Ok(false);
        }

        let path = open_session_path(&self.log_dir)?;
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .from_writer(File::create(&path)?);
        wtr.write_record(LOG_HEADER)?;

        self.tx
            .send(LogMsg::Open(wtr, path.clone()))
            .map_err(|_| Error::LinkClosed)?;
        info!("[LogSink] recording to {}", path.display());
        state.recording = true;
        state.path = Some(path);
        Ok(true)
    }

    pub fn stats(&self) -> LogSinkStats {
        LogSinkStats {
            rows_written: self.counters.rows_written.load(Ordering::Relaxed),
            rows_dropped: self.counters.rows_dropped.load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
        }
    }

    /// Drain everything queued so far, close the session and join the worker.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LogMsg::Shutdown);
        if let Some(h) = self.worker.lock().take() {
            let _ = h.join();
        }
        let mut state = self.state.lock();
        state.recording = false;
        state.path = None;
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn close_session(session: Option<(Writer<File>, PathBuf)>) {
    if let Some((mut wtr, path)) = session {
        if let Err(e) = wtr.flush() {
            error!("[LogSink] final flush of {} failed: {}", path.display(), e);
        }
        debug!("[LogSink] closed {}", path.display());
    }
}

/// `log_YYYYmmdd_HHMMSS.csv` under `dir`, with `_N` appended on collision.
fn open_session_path(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stem = format!("log_{}", Local::now().format("%Y%m%d_%H%M%S"));
    let mut path = dir.join(format!("{stem}.csv"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{n}.csv"));
        n += 1;
    }
    Ok(path)
}
