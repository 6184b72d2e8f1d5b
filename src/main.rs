//! # Pendulum Link Entry Point
//!
//! Opens the rig's serial port, starts the receive and transmit units and
//! drives the operator interface from a text menu.
//!
//! ## Threads
//! - **link-rx:** max priority (optionally pinned), read -> decode -> dispatch.
//! - **link-tx:** 50 Hz paced joystick stream + queued gain/reset commands.
//! - **log-sink:** CSV writer fed by an unbounded queue.
//! - **status:** once per second pulls the capture window, refits and logs a status line.
//!
//! ## Config
//! `pendulum_link [--config rig.toml]`; see `config.rs` for every key.
//! Log level via `RUST_LOG` (default `info`).

use std::{
    io::{BufRead, Write, stdin, stdout},
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{error, info, warn};

use pendulum_link::{
    config::AppConfig,
    link::{
        codec::Gains,
        reader::{LinkReader, spawn_reader},
        transmitter::{SharedJoystick, Transmitter, command_channel, spawn_transmitter},
        transport::{SerialLink, available_ports},
    },
    pipeline::{dispatcher::Dispatcher, monitor::Monitor},
    utils::diagnostics::LinkDiagnostics,
};

const STATUS_PERIOD: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("=== PENDULUM LINK START ===");

    let cfg = match AppConfig::from_args(std::env::args()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Transport failure is fatal: neither unit starts.
    let link = match SerialLink::open(&cfg.serial) {
        Ok(link) => link,
        Err(e) => {
            error!("Cannot open {}: {}", cfg.serial.port, e);
            match available_ports() {
                Ok(ports) if !ports.is_empty() => info!("Available ports: {}", ports.join(", ")),
                _ => info!("No serial ports found"),
            }
            return ExitCode::FAILURE;
        }
    };

    match run(cfg, link) {
        Ok(()) => {
            info!("=== PENDULUM LINK FINISHED ===");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: AppConfig, link: SerialLink) -> pendulum_link::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let diagnostics = Arc::new(LinkDiagnostics::default());
    let (commands, command_rx) = command_channel();
    let monitor = Arc::new(Monitor::new(&cfg, commands, diagnostics.clone())?);

    // Receive unit
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

    // Transmit unit; joystick stays neutral unless an input source updates it.
    let joystick: SharedJoystick = Arc::default();
    let tx = Transmitter::new(
        link.writer,
        command_rx,
        joystick,
        cfg.transmit.period(),
        running.clone(),
        diagnostics.clone(),
    );
    let tx_handle = spawn_transmitter(tx)?;

    // Status line + capture refresh
    let status_handle = {
        let monitor = monitor.clone();
        let running = running.clone();
        let diagnostics = diagnostics.clone();
        thread::Builder::new().name("status".into()).spawn(move || {
            let mut last = Instant::now();
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
                monitor.capture_tick();
                if last.elapsed() >= STATUS_PERIOD {
                    info!("{}", monitor.status());
                    diagnostics.log_recent_events();
                    last = Instant::now();
                }
            }
        })?
    };

    info!("Link up on {}", link.name);
    menu_loop(&monitor);

    running.store(false, Ordering::Release);
    for (name, h) in [("rx", rx_handle), ("tx", tx_handle), ("status", status_handle)] {
        if h.join().is_err() {
            warn!("{} thread panicked", name);
        }
    }
    monitor.shutdown();
    info!("Final: {}", monitor.status());
    Ok(())
}

fn menu_loop(monitor: &Monitor) {
    loop {
        let Some(choice) = prompt_menu() else {
            println!("Input closed. Exiting.");
            return;
        };
        match choice.as_str() {
            "1" => monitor.start_capture(),
            "2" => monitor.stop_capture(),
            "3" => monitor.reset_capture(),
            "4" => match monitor.toggle_recording() {
                Ok(true) => println!("Recording ON"),
                Ok(false) => println!("Recording OFF"),
                Err(e) => println!("Recording failed: {}", e),
            },
            "5" => {
                let on = monitor.toggle_network_sink();
                println!("Broadcast {}", if on { "ON" } else { "OFF" });
            }
            "6" => {
                let gains = prompt_gains(monitor.gains());
                if let Err(e) = monitor.apply_gains(gains) {
                    println!("{}", e);
                }
            }
            "7" => {
                if let Err(e) = monitor.start_system() {
                    println!("{}", e);
                }
            }
            "8" => {
                if let Err(e) = monitor.send_reset() {
                    println!("{}", e);
                }
            }
            "9" | "" => println!("{}", monitor.status()),
            "0" | "q" => {
                println!("Exiting. Goodbye!");
                return;
            }
            other => println!("Unrecognized option '{}', please try again.", other),
        }
    }
}

fn prompt_menu() -> Option<String> {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     PENDULUM LINK                           │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Start capture     2) Stop capture       │");
    println!("│  3) Reset capture     4) Toggle recording   │");
    println!("│  5) Toggle broadcast  6) Apply gains        │");
    println!("│  7) Start system      8) Reset rig          │");
    println!("│  9) Status            0) Exit               │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select (default: 9): ");
    let _ = stdout().flush();
    read_choice(&mut stdin().lock())
}

/// One trimmed line, or `None` once the input is at EOF or unreadable.
fn read_choice<R: BufRead>(input: &mut R) -> Option<String> {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn prompt_f32(label: &str, current: f32) -> f32 {
    print!("{} [{}]: ", label, current);
    let _ = stdout().flush();
    read_choice(&mut stdin().lock())
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(current)
}

fn prompt_gains(current: Gains) -> Gains {
    Gains {
        k_th: prompt_f32("K_TH", current.k_th),
        k_th_d: prompt_f32("K_TH_D", current.k_th_d),
        k_x: prompt_f32("K_X", current.k_x),
        k_x_d: prompt_f32("K_X_D", current.k_x_d),
        k_x_int: prompt_f32("K_X_INT", current.k_x_int),
    }
}
