//! Error types for the pendulum link.
//!
//! Only startup failures (transport open, config parse) are fatal. Everything
//! on the receive path is caught and logged where it happens.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `start` requested before a gain set was sent to the rig
    #[error("Gains have not been applied")]
    GainsNotApplied,

    /// Gain changes are refused while the rig is balancing
    #[error("Rig is running; stop it first")]
    SystemRunning,

    /// Transmit unit is gone (channel closed)
    #[error("Link closed")]
    LinkClosed,

    /// A subscriber rejected a value
    #[error("Subscriber failed: {0}")]
    Subscriber(String),
}
