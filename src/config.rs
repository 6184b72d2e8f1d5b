//! config.rs
//! Runtime configuration for the link and its sinks.
//!
//! - Loaded from an optional TOML file; every field has a default so an empty
//!   file (or no file at all) gives a working setup for the bench rig.
//! - Path comes from `--config <path>`, `-c <path>` or the first positional arg.

use std::{fs, net::SocketAddr, path::PathBuf, time::Duration};

use log::info;
use serde::Deserialize;

use crate::error::Result;
use crate::link::codec::Gains;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub transmit: TransmitConfig,
    pub recording: RecordingConfig,
    pub network: NetworkConfig,
    pub telemetry: TelemetryConfig,
    pub gains: Gains,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout; a timed-out read counts as zero bytes.
    pub read_timeout_ms: u64,
    pub read_chunk: usize,
    /// Sleep when a read returned nothing.
    pub idle_sleep_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 10,
            read_chunk: 128,
            idle_sleep_ms: 10,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    pub rate_hz: f64,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self { rate_hz: 50.0 }
    }
}

impl TransmitConfig {
    pub fn period(&self) -> Duration {
        if self.rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / self.rate_hz)
        } else {
            Duration::from_millis(20)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub log_dir: PathBuf,
    pub flush_every: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            flush_every: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub target: SocketAddr,
    pub enabled: bool,
    pub log_every: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::from(([192, 168, 1, 255], 5000)),
            enabled: false,
            log_every: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub history_points: usize,
    pub window_points: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_points: 1000,
            window_points: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Core to pin the receive thread to.
    pub rx_core: Option<usize>,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg = Self::from_toml(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Resolve the config from process arguments; defaults when no path is given.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        match config_path(args) {
            Some(path) => Self::load(&path),
            None => {
                info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }
}

fn config_path<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => return args.next().map(PathBuf::from),
            s if !s.starts_with('-') => return Some(PathBuf::from(s)),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyACM0");
        assert_eq!(cfg.serial.baud_rate, 115_200);
        assert_eq!(cfg.serial.read_chunk, 128);
        assert_eq!(cfg.transmit.period(), Duration::from_millis(20));
        assert_eq!(cfg.telemetry.history_points, 1000);
        assert_eq!(cfg.telemetry.window_points, 3000);
        assert_eq!(cfg.network.target.port(), 5000);
        assert!(!cfg.network.enabled);
        assert_eq!(cfg.gains, Gains::default());
        assert_eq!(cfg.runtime.rx_core, None);
    }

    #[test]
    fn partial_sections_override() {
        let cfg = AppConfig::from_toml(
            r#"
            [serial]
            port = "/dev/ttyUSB1"

            [network]
            target = "127.0.0.1:6000"
            enabled = true

            [gains]
            k_x = 4.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyUSB1");
        assert_eq!(cfg.serial.baud_rate, 115_200);
        assert!(cfg.network.enabled);
        assert_eq!(cfg.network.target.port(), 6000);
        assert_eq!(cfg.gains.k_x, 4.5);
        assert_eq!(cfg.gains.k_th, Gains::default().k_th);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = AppConfig::from_toml("serial = 3").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn path_from_args() {
        assert_eq!(config_path(args(&["bin"])), None);
        assert_eq!(
            config_path(args(&["bin", "--config", "rig.toml"])),
            Some(PathBuf::from("rig.toml"))
        );
        assert_eq!(
            config_path(args(&["bin", "-c", "a.toml"])),
            Some(PathBuf::from("a.toml"))
        );
        assert_eq!(
            config_path(args(&["bin", "b.toml"])),
            Some(PathBuf::from("b.toml"))
        );
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        fs::write(&path, "[transmit]\nrate_hz = 100.0\n").unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.transmit.period(), Duration::from_millis(10));
    }
}
