// Alternative runtimes for the link units (async transmit path).
pub mod async_transmitter;
