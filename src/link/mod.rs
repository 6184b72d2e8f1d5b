// Link layer: everything that touches the serial wire.
// Byte-stream framing, packet layouts, the receive unit and the paced
// transmit unit that share one full-duplex port.

pub mod codec;
pub mod decoder;
pub mod reader;
pub mod transmitter;
pub mod transport;
