//! codec.rs
//! Binary layouts of every packet on the rig link, plus the UDP broadcast layout.
//!
//! Inbound (MCU -> host), all little-endian:
//!
//! | Kind          | Magic   | Prefix | Payload                         | Total |
//! |---------------|---------|--------|---------------------------------|-------|
//! | ControlStatus | `AA CC` | 4      | u32 tick + 8 x f64              | 74    |
//! | GainsAck      | `AA DD` | 2      | 5 x f32                         | 24    |
//! | ResetAck      | `AA EE` | 2      | u8 status                       | 5     |
//!
//! The trailing u16 is the unsigned byte sum of the payload modulo 65536.
//! ControlStatus carries two unparsed bytes after the magic; they are not
//! summed. This matches the firmware and must stay as is.
//!
//! Outbound (host -> MCU): `AA 55 | type | seq | payload | sum16(type..payload)`.
//! The joystick packet sums modulo 65535, every other packet modulo 65536.

use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const MAGIC_CONTROL_STATUS: [u8; 2] = [0xAA, 0xCC];
pub const MAGIC_GAINS_ACK: [u8; 2] = [0xAA, 0xDD];
pub const MAGIC_RESET_ACK: [u8; 2] = [0xAA, 0xEE];
pub const MAGIC_COMMAND: [u8; 2] = [0xAA, 0x55];

/// First byte shared by every magic.
pub const SYNC_BYTE: u8 = 0xAA;

pub const TYPE_JOYSTICK: u8 = 0x01;
pub const TYPE_SET_GAINS: u8 = 0x02;
pub const TYPE_RESET: u8 = 0x03;

const CHECKSUM_LEN: usize = 2;
const JOYSTICK_CHECKSUM_MODULUS: u32 = 65_535;
const CHECKSUM_MODULUS: u32 = 65_536;

/// Broadcast datagram: u32 tick + 7 x f64.
pub const BROADCAST_LEN: usize = 4 + 7 * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    ControlStatus,
    GainsAck,
    ResetAck,
}

impl FrameKind {
    pub const ALL: [FrameKind; 3] = [
        FrameKind::ControlStatus,
        FrameKind::GainsAck,
        FrameKind::ResetAck,
    ];

    pub fn magic(&self) -> [u8; 2] {
        match self {
            FrameKind::ControlStatus => MAGIC_CONTROL_STATUS,
            FrameKind::GainsAck => MAGIC_GAINS_ACK,
            FrameKind::ResetAck => MAGIC_RESET_ACK,
        }
    }

    pub fn from_magic(magic: [u8; 2]) -> Option<Self> {
        FrameKind::ALL.into_iter().find(|k| k.magic() == magic)
    }

    /// Bytes before the payload (magic included).
    pub fn prefix_len(&self) -> usize {
        match self {
            FrameKind::ControlStatus => 4,
            FrameKind::GainsAck | FrameKind::ResetAck => 2,
        }
    }

    pub fn payload_len(&self) -> usize {
        match self {
            FrameKind::ControlStatus => 4 + 8 * 8,
            FrameKind::GainsAck => 5 * 4,
            FrameKind::ResetAck => 1,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.prefix_len() + self.payload_len() + CHECKSUM_LEN
    }

    /// Byte range of a whole frame that the trailer checksum covers.
    pub fn checksum_range(&self) -> Range<usize> {
        self.prefix_len()..self.prefix_len() + self.payload_len()
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::ControlStatus => "control_status",
            FrameKind::GainsAck => "gains_ack",
            FrameKind::ResetAck => "reset_ack",
        }
    }
}

/// One decoded ControlStatus payload.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub tick: u32,
    pub degree: f64,
    pub cm_x: f64,
    pub setspeed: f64,
    pub reserved: [f64; 5],
}

/// Controller gain set, as sent in SetGains and echoed in GainsAck.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gains {
    pub k_th: f32,
    pub k_th_d: f32,
    pub k_x: f32,
    pub k_x_d: f32,
    pub k_x_int: f32,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            k_th: -1710.0,
            k_th_d: -30.78,
            k_x: 3.0,
            k_x_d: -3.2,
            k_x_int: 0.0,
        }
    }
}

impl Gains {
    pub fn to_array(&self) -> [f32; 5] {
        [self.k_th, self.k_th_d, self.k_x, self.k_x_d, self.k_x_int]
    }

    pub fn from_array(v: [f32; 5]) -> Self {
        Self {
            k_th: v[0],
            k_th_d: v[1],
            k_x: v[2],
            k_x_d: v[3],
            k_x_int: v[4],
        }
    }
}

/// A validated inbound frame, parsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet {
    ControlStatus(Sample),
    GainsAck(Gains),
    ResetAck(u8),
}

impl Packet {
    pub fn kind(&self) -> FrameKind {
        match self {
            Packet::ControlStatus(_) => FrameKind::ControlStatus,
            Packet::GainsAck(_) => FrameKind::GainsAck,
            Packet::ResetAck(_) => FrameKind::ResetAck,
        }
    }
}

/// Joystick state streamed to the MCU every transmit tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoystickState {
    pub axis_x: i16,
    pub axis_y: i16,
    pub rot_x: i16,
    pub rot_y: i16,
    pub buttons: u16,
}

/// Outbound packet body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Joystick(JoystickState),
    SetGains(Gains),
    Reset,
}

impl Command {
    pub fn type_byte(&self) -> u8 {
        match self {
            Command::Joystick(_) => TYPE_JOYSTICK,
            Command::SetGains(_) => TYPE_SET_GAINS,
            Command::Reset => TYPE_RESET,
        }
    }
}

// ============================================================================
// Checksums
// ============================================================================

fn byte_sum(bytes: &[u8], modulus: u32) -> u16 {
    let sum = bytes.iter().fold(0u32, |acc, &b| (acc + b as u32) % modulus);
    sum as u16
}

/// Unsigned byte sum modulo 65536.
#[inline]
pub fn sum16(bytes: &[u8]) -> u16 {
    byte_sum(bytes, CHECKSUM_MODULUS)
}

/// Checksum the decoder expects for `frame` (a full frame of `kind`).
pub fn computed_checksum(kind: FrameKind, frame: &[u8]) -> Option<u16> {
    frame.get(kind.checksum_range()).map(sum16)
}

/// Little-endian trailer of a frame.
pub fn trailer_checksum(frame: &[u8]) -> Option<u16> {
    let n = frame.len();
    if n < CHECKSUM_LEN {
        return None;
    }
    Some(u16::from_le_bytes([frame[n - 2], frame[n - 1]]))
}

// ============================================================================
// Inbound decode / encode
// ============================================================================

fn read_u32(bytes: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(off..off + 4)?.try_into().ok()?))
}

fn read_f64(bytes: &[u8], off: usize) -> Option<f64> {
    Some(f64::from_le_bytes(bytes.get(off..off + 8)?.try_into().ok()?))
}

fn read_f32(bytes: &[u8], off: usize) -> Option<f32> {
    Some(f32::from_le_bytes(bytes.get(off..off + 4)?.try_into().ok()?))
}

fn read_i16(bytes: &[u8], off: usize) -> Option<i16> {
    Some(i16::from_le_bytes(bytes.get(off..off + 2)?.try_into().ok()?))
}

fn read_u16(bytes: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(off..off + 2)?.try_into().ok()?))
}

/// Parse a checksum-validated frame. `None` when the length does not match `kind`.
pub fn decode(kind: FrameKind, frame: &[u8]) -> Option<Packet> {
    if frame.len() != kind.frame_len() {
        return None;
    }
    let payload = &frame[kind.checksum_range()];

    match kind {
        FrameKind::ControlStatus => {
            let mut values = [0.0f64; 8];
            for (i, v) in values.iter_mut().enumerate() {
                *v = read_f64(payload, 4 + i * 8)?;
            }
            Some(Packet::ControlStatus(Sample {
                tick: read_u32(payload, 0)?,
                degree: values[0],
                cm_x: values[1],
                setspeed: values[2],
                reserved: [values[3], values[4], values[5], values[6], values[7]],
            }))
        }
        FrameKind::GainsAck => {
            let mut g = [0.0f32; 5];
            for (i, v) in g.iter_mut().enumerate() {
                *v = read_f32(payload, i * 4)?;
            }
            Some(Packet::GainsAck(Gains::from_array(g)))
        }
        FrameKind::ResetAck => Some(Packet::ResetAck(payload[0])),
    }
}

/// Build an inbound frame as the MCU would send it (prefix padding zeroed).
/// Used by replay tooling, tests and benches.
pub fn encode_frame(packet: &Packet) -> Vec<u8> {
    let kind = packet.kind();
    let mut buf = Vec::with_capacity(kind.frame_len());
    buf.extend_from_slice(&kind.magic());
    buf.resize(kind.prefix_len(), 0);

    match packet {
        Packet::ControlStatus(s) => {
            buf.extend_from_slice(&s.tick.to_le_bytes());
            for v in [s.degree, s.cm_x, s.setspeed] {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            for v in s.reserved {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        Packet::GainsAck(g) => {
            for v in g.to_array() {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        Packet::ResetAck(status) => buf.push(*status),
    }

    let crc = sum16(&buf[kind.checksum_range()]);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

// ============================================================================
// Outbound encode / decode
// ============================================================================

/// Encode a host -> MCU packet.
pub fn encode_command(command: &Command, seq: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(26);
    buf.extend_from_slice(&MAGIC_COMMAND);
    buf.push(command.type_byte());
    buf.push(seq);

    let modulus = match command {
        Command::Joystick(js) => {
            for v in [js.axis_x, js.axis_y, js.rot_x, js.rot_y] {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            buf.extend_from_slice(&js.buttons.to_le_bytes());
            JOYSTICK_CHECKSUM_MODULUS
        }
        Command::SetGains(g) => {
            for v in g.to_array() {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            CHECKSUM_MODULUS
        }
        Command::Reset => CHECKSUM_MODULUS,
    };

    let crc = byte_sum(&buf[2..], modulus);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Parse a host -> MCU packet back into `(command, seq)`; `None` on any
/// length, type or checksum error.
pub fn decode_command(bytes: &[u8]) -> Option<(Command, u8)> {
    if bytes.len() < 6 || bytes[..2] != MAGIC_COMMAND {
        return None;
    }
    let body = &bytes[2..bytes.len() - CHECKSUM_LEN];
    let seq = body[1];

    let (command, modulus) = match body[0] {
        TYPE_JOYSTICK if body.len() == 12 => (
            Command::Joystick(JoystickState {
                axis_x: read_i16(body, 2)?,
                axis_y: read_i16(body, 4)?,
                rot_x: read_i16(body, 6)?,
                rot_y: read_i16(body, 8)?,
                buttons: read_u16(body, 10)?,
            }),
            JOYSTICK_CHECKSUM_MODULUS,
        ),
        TYPE_SET_GAINS if body.len() == 22 => {
            let mut g = [0.0f32; 5];
            for (i, v) in g.iter_mut().enumerate() {
                *v = read_f32(body, 2 + i * 4)?;
            }
            (Command::SetGains(Gains::from_array(g)), CHECKSUM_MODULUS)
        }
        TYPE_RESET if body.len() == 2 => (Command::Reset, CHECKSUM_MODULUS),
        _ => return None,
    };

    if trailer_checksum(bytes)? != byte_sum(body, modulus) {
        return None;
    }
    Some((command, seq))
}

// ============================================================================
// Network broadcast layout
// ============================================================================

/// `u32 tick + degree, cm_x, setspeed, reserved[0..4]` as f64.
pub fn encode_broadcast(sample: &Sample) -> [u8; BROADCAST_LEN] {
    let mut out = [0u8; BROADCAST_LEN];
    out[..4].copy_from_slice(&sample.tick.to_le_bytes());
    let values = [
        sample.degree,
        sample.cm_x,
        sample.setspeed,
        sample.reserved[0],
        sample.reserved[1],
        sample.reserved[2],
        sample.reserved[3],
    ];
    for (i, v) in values.iter().enumerate() {
        let off = 4 + i * 8;
        out[off..off + 8].copy_from_slice(&v.to_le_bytes());
    }
    out
}

/// Inverse of [`encode_broadcast`] for receivers: `(tick, values)`.
pub fn decode_broadcast(bytes: &[u8]) -> Option<(u32, [f64; 7])> {
    if bytes.len() != BROADCAST_LEN {
        return None;
    }
    let mut values = [0.0f64; 7];
    for (i, v) in values.iter_mut().enumerate() {
        *v = read_f64(bytes, 4 + i * 8)?;
    }
    Some((read_u32(bytes, 0)?, values))
}
