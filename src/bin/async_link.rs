//! Headless link on the tokio runtime (async_link binary).
//!
//! Same receive unit as `pendulum_link` (blocking thread, max priority), but
//! the transmit schedule runs as a tokio interval task feeding a blocking
//! writer thread. Captures from start-up and logs a status line every second
//! until Ctrl-C.

use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{error, info, warn};
use tokio::{
    sync::mpsc,
    time::{self, Duration, MissedTickBehavior},
};

use pendulum_link::{
    advanced::async_transmitter::{OUTBOUND_CAPACITY, async_transmit_loop, spawn_blocking_writer},
    config::AppConfig,
    link::{
        reader::{LinkReader, spawn_reader},
        transmitter::{SharedJoystick, command_channel},
        transport::SerialLink,
    },
    pipeline::{dispatcher::Dispatcher, monitor::Monitor},
    utils::diagnostics::LinkDiagnostics,
};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("=== ASYNC LINK START ===");

    let cfg = match AppConfig::from_args(std::env::args()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cfg).await {
        Ok(()) => {
            info!("=== ASYNC LINK FINISHED ===");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: AppConfig) -> pendulum_link::Result<()> {
    let link = SerialLink::open(&cfg.serial)?;

    let running = Arc::new(AtomicBool::new(true));
    let diagnostics = Arc::new(LinkDiagnostics::default());
    let (commands, command_rx) = command_channel();
    let monitor = Arc::new(Monitor::new(&cfg, commands, diagnostics.clone())?);

    let mut dispatcher = Dispatcher::new(diagnostics.clone());
    monitor.attach(&mut dispatcher);
    let reader = LinkReader::new(
        link.reader,
        dispatcher,
        diagnostics.clone(),
        &cfg.serial,
        running.clone(),
    );
    let rx_handle = spawn_reader(reader, cfg.runtime.rx_core)?;

    // Timer task -> bounded queue -> blocking serial writer
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_CAPACITY);
    let writer_handle = spawn_blocking_writer(out_rx, link.writer, diagnostics.clone())?;
    let joystick: SharedJoystick = Arc::default();
    let tx_task = tokio::spawn(async_transmit_loop(
        command_rx,
        joystick,
        cfg.transmit.period(),
        out_tx,
        running.clone(),
        diagnostics.clone(),
    ));

    monitor.start_capture();
    let mut status = time::interval(Duration::from_secs(1));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = status.tick() => {
                monitor.capture_tick();
                info!("{}", monitor.status());
                diagnostics.log_recent_events();
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("Ctrl-C handler failed: {}", e);
                }
                break;
            }
        }
    }

    info!("Stopping async link...");
    running.store(false, Ordering::Release);
    if let Err(e) = tx_task.await {
        warn!("transmit task failed: {}", e);
    }
    let joined = tokio::task::spawn_blocking(move || {
        let rx_ok = rx_handle.join().is_ok();
        let tx_ok = writer_handle.join().is_ok();
        rx_ok && tx_ok
    })
    .await;
    if !matches!(joined, Ok(true)) {
        warn!("a link thread panicked");
    }

    monitor.shutdown();
    info!("Final: {}", monitor.status());
    Ok(())
}
