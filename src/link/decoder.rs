//! decoder.rs
//! Recovers typed frames from the raw serial byte stream.
//!
//! - Chunks of any size (zero included) are appended to an accumulator
//! - The earliest magic of any kind wins; bytes before it are garbage
//! - A truncated frame stays buffered until the rest arrives
//! - A checksum mismatch drops exactly that frame and scanning resumes after it
//!
//! Nothing here is fatal: corrupt input only shows up as `DecodeEvent`s
//! other than `Frame`.

use log::debug;

use crate::link::codec::{self, FrameKind, Packet, SYNC_BYTE};

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    Frame(Packet),
    ChecksumMismatch {
        kind: FrameKind,
        expected: u16,
        received: u16,
    },
    /// Bytes dropped while hunting for a magic.
    Discarded(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u64,
    pub checksum_failures: u64,
    pub bytes_discarded: u64,
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes currently waiting in the accumulator.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Run one extraction attempt. `None` means no progress is possible
    /// until more bytes arrive.
    pub fn poll(&mut self) -> Option<DecodeEvent> {
        let Some((offset, kind)) = find_magic(&self.buf) else {
            return self.discard_unsynced();
        };

        if offset > 0 {
            self.buf.drain(..offset);
            self.stats.bytes_discarded += offset as u64;
            return Some(DecodeEvent::Discarded(offset));
        }

        let len = kind.frame_len();
        if self.buf.len() < len {
            return None;
        }

        let frame: Vec<u8> = self.buf.drain(..len).collect();
        let expected = codec::computed_checksum(kind, &frame);
        let received = codec::trailer_checksum(&frame);

        match (expected, received) {
            (Some(expected), Some(received)) if expected == received => {
                match codec::decode(kind, &frame) {
                    Some(packet) => {
                        self.stats.frames += 1;
                        Some(DecodeEvent::Frame(packet))
                    }
                    None => {
                        self.stats.bytes_discarded += len as u64;
                        Some(DecodeEvent::Discarded(len))
                    }
                }
            }
            (expected, received) => {
                let expected = expected.unwrap_or_default();
                let received = received.unwrap_or_default();
                debug!(
                    "[FrameDecoder] {} checksum mismatch: computed {:#06x}, trailer {:#06x}",
                    kind.name(),
                    expected,
                    received
                );
                self.stats.checksum_failures += 1;
                Some(DecodeEvent::ChecksumMismatch {
                    kind,
                    expected,
                    received,
                })
            }
        }
    }

    /// Push a chunk, then extract until stalled. Convenience for callers
    /// that handle every event inline.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_event: F)
    where
        F: FnMut(DecodeEvent),
    {
        self.push(chunk);
        while let Some(ev) = self.poll() {
            on_event(ev);
        }
    }

    /// No magic anywhere: drop the accumulator, but keep a trailing sync byte
    /// since the second magic byte may be in the next chunk.
    fn discard_unsynced(&mut self) -> Option<DecodeEvent> {
        let keep = usize::from(self.buf.last() == Some(&SYNC_BYTE));
        let dropped = self.buf.len() - keep;
        if dropped == 0 {
            return None;
        }
        self.buf.drain(..dropped);
        self.stats.bytes_discarded += dropped as u64;
        Some(DecodeEvent::Discarded(dropped))
    }
}

/// Earliest offset holding any inbound magic, regardless of kind.
fn find_magic(buf: &[u8]) -> Option<(usize, FrameKind)> {
    buf.windows(2).enumerate().find_map(|(i, w)| {
        if w[0] != SYNC_BYTE {
            return None;
        }
        FrameKind::from_magic([w[0], w[1]]).map(|k| (i, k))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::codec::{Gains, Sample, encode_frame};

    fn status(tick: u32) -> Packet {
        Packet::ControlStatus(Sample {
            tick,
            degree: 12.5,
            cm_x: 3.2,
            setspeed: 0.0,
            reserved: [0.0; 5],
        })
    }

    fn frames(decoder: &mut FrameDecoder, chunk: &[u8]) -> Vec<Packet> {
        let mut out = Vec::new();
        decoder.feed(chunk, |ev| {
            if let DecodeEvent::Frame(p) = ev {
                out.push(p);
            }
        });
        out
    }

    #[test]
    fn decodes_single_status_frame() {
        let mut d = FrameDecoder::new();
        let got = frames(&mut d, &encode_frame(&status(1000)));
        assert_eq!(got, vec![status(1000)]);
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn zero_length_chunk_is_harmless() {
        let mut d = FrameDecoder::new();
        assert!(frames(&mut d, &[]).is_empty());
        assert_eq!(d.stats(), DecoderStats::default());
    }

    #[test]
    fn truncated_frame_waits_for_rest() {
        let mut d = FrameDecoder::new();
        let bytes = encode_frame(&status(5));
        assert!(frames(&mut d, &bytes[..40]).is_empty());
        assert_eq!(d.buffered(), 40);
        assert_eq!(frames(&mut d, &bytes[40..]), vec![status(5)]);
    }

    #[test]
    fn garbage_around_frame_is_dropped() {
        let mut d = FrameDecoder::new();
        let mut stream = vec![0x01, 0x02, 0x03];
        stream.extend(encode_frame(&Packet::ResetAck(1)));
        stream.extend([0x10, 0x20]);
        assert_eq!(frames(&mut d, &stream), vec![Packet::ResetAck(1)]);
        assert_eq!(d.buffered(), 0);
        assert_eq!(d.stats().bytes_discarded, 5);
    }

    #[test]
    fn earliest_magic_wins_over_kind() {
        let mut stream = encode_frame(&Packet::ResetAck(9));
        stream.extend(encode_frame(&status(1)));
        stream.extend(encode_frame(&Packet::GainsAck(Gains::default())));
        let mut d = FrameDecoder::new();
        assert_eq!(
            frames(&mut d, &stream),
            vec![
                Packet::ResetAck(9),
                status(1),
                Packet::GainsAck(Gains::default())
            ]
        );
    }

    #[test]
    fn bad_checksum_drops_one_frame_then_resyncs() {
        let mut bad = encode_frame(&status(1));
        bad[10] ^= 0x40;
        let mut stream = bad;
        stream.extend(encode_frame(&status(2)));

        let mut d = FrameDecoder::new();
        let mut events = Vec::new();
        d.feed(&stream, |ev| events.push(ev));
        assert!(matches!(
            events[0],
            DecodeEvent::ChecksumMismatch {
                kind: FrameKind::ControlStatus,
                ..
            }
        ));
        assert_eq!(events[1], DecodeEvent::Frame(status(2)));
        assert_eq!(d.stats().checksum_failures, 1);
        assert_eq!(d.stats().frames, 1);
    }

    #[test]
    fn magic_split_across_chunks() {
        let bytes = encode_frame(&Packet::ResetAck(3));
        let mut d = FrameDecoder::new();
        assert!(frames(&mut d, &[0x55, 0x66, bytes[0]]).is_empty());
        assert_eq!(d.buffered(), 1);
        assert_eq!(frames(&mut d, &bytes[1..]), vec![Packet::ResetAck(3)]);
    }

    #[test]
    fn two_gains_acks_back_to_back() {
        let a = Gains::from_array([1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = Gains::from_array([-1.0, -2.0, -3.0, -4.0, -5.0]);
        let mut stream = encode_frame(&Packet::GainsAck(a));
        stream.extend(encode_frame(&Packet::GainsAck(b)));
        assert_eq!(stream.len(), 48);

        let mut d = FrameDecoder::new();
        assert_eq!(
            frames(&mut d, &stream),
            vec![Packet::GainsAck(a), Packet::GainsAck(b)]
        );
    }
}
