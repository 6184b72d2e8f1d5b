//! transport.rs
//! Serial port setup and the read contract shared by every byte source.
//!
//! The port is opened once and split into a reader handle (receive unit) and a
//! writer handle (transmit unit) via `try_clone`; the OS driver allows one
//! concurrent reader and one concurrent writer on the full-duplex line.

use std::io::{self, Read};

use log::info;
use serialport::SerialPort;

use crate::config::SerialConfig;
use crate::error::Result;

pub struct SerialLink {
    pub name: String,
    pub reader: Box<dyn SerialPort>,
    pub writer: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open and split the port. Failure here is fatal for the caller.
    pub fn open(cfg: &SerialConfig) -> Result<Self> {
        let reader = serialport::new(&cfg.port, cfg.baud_rate)
            .timeout(cfg.read_timeout())
            .open()?;
        let writer = reader.try_clone()?;
        info!("[SerialLink] opened {} @ {} baud", cfg.port, cfg.baud_rate);
        Ok(Self {
            name: cfg.port.clone(),
            reader,
            writer,
        })
    }
}

/// List serial ports the OS knows about.
pub fn available_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

/// Read once; a timeout or an interrupted/would-block read counts as 0 bytes.
pub fn read_chunk<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    match source.read(buf) {
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(e) => Err(e),
    }
}
