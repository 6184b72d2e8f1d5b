// Shared helpers: link health counters and event ring.
pub mod diagnostics;
