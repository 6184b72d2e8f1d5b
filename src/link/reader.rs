//! reader.rs
//! Receive unit: transport -> decoder -> dispatcher.
//!
//! - Short-timeout reads; an empty read sleeps briefly instead of blocking
//! - Read errors are logged and counted, then the loop backs off and retries
//! - Runs on its own thread at max OS priority, optionally pinned to a core

use std::{
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::config::SerialConfig;
use crate::error::Result;
use crate::link::decoder::{DecodeEvent, FrameDecoder};
use crate::link::transport::read_chunk;
use crate::pipeline::dispatcher::Dispatcher;
use crate::utils::diagnostics::LinkDiagnostics;

pub struct LinkReader<R> {
    source: R,
    decoder: FrameDecoder,
    dispatcher: Dispatcher,
    diagnostics: Arc<LinkDiagnostics>,
    buf: Vec<u8>,
    idle_sleep: Duration,
    running: Arc<AtomicBool>,
}

impl<R: Read> LinkReader<R> {
    pub fn new(
        source: R,
        dispatcher: Dispatcher,
        diagnostics: Arc<LinkDiagnostics>,
        cfg: &SerialConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            decoder: FrameDecoder::new(),
            dispatcher,
            diagnostics,
            buf: vec![0u8; cfg.read_chunk.max(1)],
            idle_sleep: cfg.idle_sleep(),
            running,
        }
    }

    /// One read + decode cycle. Returns bytes read (0 on timeout).
    pub fn poll_once(&mut self) -> std::io::Result<usize> {
        let n = read_chunk(&mut self.source, &mut self.buf)?;
        if n == 0 {
            return Ok(0);
        }

        let Self {
            decoder,
            dispatcher,
            diagnostics,
            buf,
            ..
        } = self;
        decoder.feed(&buf[..n], |ev| match ev {
            DecodeEvent::Frame(packet) => dispatcher.publish(&packet),
            DecodeEvent::ChecksumMismatch {
                kind,
                expected,
                received,
            } => diagnostics.record_checksum_failure(kind, expected, received),
            DecodeEvent::Discarded(bytes) => {
                debug!("[LinkReader] discarded {} bytes of garbage", bytes);
                diagnostics.record_discard(bytes);
            }
        });
        Ok(n)
    }

    /// Loop until the running flag drops.
    pub fn run(&mut self) {
        while self.running.load(Ordering::Acquire) {
            match self.poll_once() {
                Ok(0) => thread::sleep(self.idle_sleep),
                Ok(_) => {}
                Err(e) => {
                    error!("[LinkReader] read error: {}", e);
                    self.diagnostics.record_read_error(e.to_string());
                    thread::sleep(self.idle_sleep);
                }
            }
        }
        debug!("[LinkReader] stopped. decoder={:?}", self.decoder.stats());
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

/// Spawn the receive unit at max priority, pinned to `core` if given.
pub fn spawn_reader<R>(mut reader: LinkReader<R>, core: Option<usize>) -> Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("link-rx".into())
        .spawn_with_priority(ThreadPriority::Max, move |prio| {
            if let Err(e) = prio {
                warn!("[LinkReader] max priority refused ({:?}), running at normal priority", e);
            }
            if let Some(core) = core {
                pin_to_core(core);
            }
            reader.run();
        })?;
    Ok(handle)
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(id) if core_affinity::set_for_current(*id) => {
            info!("[LinkReader] pinned to core {}", core);
        }
        Some(_) => error!("[LinkReader] failed to pin to core {}", core),
        None => error!("[LinkReader] core {} not available", core),
    }
}
