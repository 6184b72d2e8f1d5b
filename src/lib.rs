//! Host-side link for an inverted-pendulum rig.
//!
//! Decodes the MCU's serial telemetry, fans samples out to recording,
//! broadcast and live estimation, and streams joystick/command packets back.

pub mod advanced;
pub mod config;
pub mod error;
pub mod link;
pub mod pipeline;
pub mod utils;

pub use error::{Error, Result};
