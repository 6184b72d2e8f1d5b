// Decode-side pipeline: fan-out of decoded packets to live state,
// telemetry capture, CSV recording and UDP broadcast.

pub mod dispatcher;
pub mod log_sink;
pub mod monitor;
pub mod net_sink;
pub mod state;
pub mod telemetry;
