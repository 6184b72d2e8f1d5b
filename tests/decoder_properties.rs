use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use pendulum_link::link::codec::{
    Command, FrameKind, Gains, JoystickState, Packet, Sample, decode, decode_command,
    encode_command, encode_frame,
};
use pendulum_link::link::decoder::{DecodeEvent, FrameDecoder};
use pendulum_link::pipeline::dispatcher::Dispatcher;
use pendulum_link::utils::diagnostics::LinkDiagnostics;
use pendulum_link::Result;

// ============================================================================
// Strategies
// ============================================================================

fn finite() -> impl Strategy<Value = f64> {
    -1.0e6..1.0e6f64
}

fn finite32() -> impl Strategy<Value = f32> {
    -1.0e4f32..1.0e4f32
}

fn sample() -> impl Strategy<Value = Sample> {
    (
        any::<u32>(),
        finite(),
        finite(),
        finite(),
        prop::array::uniform5(finite()),
    )
        .prop_map(|(tick, degree, cm_x, setspeed, reserved)| Sample {
            tick,
            degree,
            cm_x,
            setspeed,
            reserved,
        })
}

fn gains() -> impl Strategy<Value = Gains> {
    prop::array::uniform5(finite32()).prop_map(Gains::from_array)
}

fn packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        sample().prop_map(Packet::ControlStatus),
        gains().prop_map(Packet::GainsAck),
        any::<u8>().prop_map(Packet::ResetAck),
    ]
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        (any::<i16>(), any::<i16>(), any::<i16>(), any::<i16>(), any::<u16>()).prop_map(
            |(axis_x, axis_y, rot_x, rot_y, buttons)| Command::Joystick(JoystickState {
                axis_x,
                axis_y,
                rot_x,
                rot_y,
                buttons,
            })
        ),
        gains().prop_map(Command::SetGains),
        Just(Command::Reset),
    ]
}

/// Bytes that can never start a magic.
fn clean_garbage() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..0xAA, 0..64)
}

// ============================================================================
// Helpers
// ============================================================================

fn decode_chunks(chunks: &[&[u8]]) -> Vec<DecodeEvent> {
    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();
    for chunk in chunks {
        decoder.feed(chunk, |ev| {
            if !matches!(ev, DecodeEvent::Discarded(_)) {
                events.push(ev);
            }
        });
    }
    events
}

fn frames_of(stream: &[u8]) -> Vec<Packet> {
    decode_chunks(&[stream])
        .into_iter()
        .filter_map(|ev| match ev {
            DecodeEvent::Frame(p) => Some(p),
            _ => None,
        })
        .collect()
}

fn recording_dispatcher() -> (Dispatcher, Arc<Mutex<Vec<Packet>>>) {
    let mut d = Dispatcher::new(Arc::new(LinkDiagnostics::default()));
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    d.subscribe_status(move |s: Sample| -> Result<()> {
        l.lock().push(Packet::ControlStatus(s));
        Ok(())
    });
    let l = log.clone();
    d.subscribe_gains_ack(move |g: Gains| -> Result<()> {
        l.lock().push(Packet::GainsAck(g));
        Ok(())
    });
    let l = log.clone();
    d.subscribe_reset_ack(move |s: u8| -> Result<()> {
        l.lock().push(Packet::ResetAck(s));
        Ok(())
    });
    (d, log)
}

// ============================================================================
// Worked examples
// ============================================================================

#[test]
fn status_example_decodes_exactly() {
    let sample = Sample {
        tick: 1000,
        degree: 12.5,
        cm_x: 3.2,
        setspeed: 0.0,
        reserved: [0.0; 5],
    };
    let stream = encode_frame(&Packet::ControlStatus(sample));
    assert_eq!(frames_of(&stream), vec![Packet::ControlStatus(sample)]);
}

#[test]
fn two_gains_acks_reach_subscriber_twice_in_order() {
    let a = Gains::from_array([-1710.0, -30.78, 3.0, -3.2, 0.0]);
    let b = Gains::from_array([-1500.0, -25.0, 2.5, -3.0, 0.1]);
    let mut stream = encode_frame(&Packet::GainsAck(a));
    stream.extend(encode_frame(&Packet::GainsAck(b)));
    assert_eq!(stream.len(), 48);

    let (mut d, log) = recording_dispatcher();
    let mut decoder = FrameDecoder::new();
    decoder.feed(&stream, |ev| {
        if let DecodeEvent::Frame(p) = ev {
            d.publish(&p);
        }
    });
    assert_eq!(*log.lock(), vec![Packet::GainsAck(a), Packet::GainsAck(b)]);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn inbound_round_trip(p in packet()) {
        let bytes = encode_frame(&p);
        prop_assert_eq!(bytes.len(), p.kind().frame_len());
        prop_assert_eq!(decode(p.kind(), &bytes), Some(p));
        prop_assert_eq!(frames_of(&bytes), vec![p]);
    }

    #[test]
    fn outbound_round_trip(cmd in command(), seq in any::<u8>()) {
        let bytes = encode_command(&cmd, seq);
        prop_assert_eq!(decode_command(&bytes), Some((cmd, seq)));
    }

    #[test]
    fn resync_drops_garbage(
        head in clean_garbage(),
        p in packet(),
        tail in clean_garbage(),
    ) {
        let mut stream = head.clone();
        stream.extend(encode_frame(&p));
        stream.extend(&tail);

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        decoder.feed(&stream, |ev| if let DecodeEvent::Frame(f) = ev { frames.push(f) });
        prop_assert_eq!(frames, vec![p]);
        prop_assert_eq!(decoder.buffered(), 0);
        prop_assert_eq!(decoder.stats().bytes_discarded, (head.len() + tail.len()) as u64);
    }

    #[test]
    fn checksum_gate(
        p in packet(),
        next in packet(),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut bad = encode_frame(&p);
        let kind = p.kind();
        let len = kind.frame_len();
        let mut guarded: Vec<usize> = kind.checksum_range().collect();
        guarded.extend([len - 2, len - 1]);
        let idx = *pick.get(&guarded);
        bad[idx] ^= 1 << bit;

        let mut stream = bad;
        stream.extend(encode_frame(&next));

        let events = decode_chunks(&[&stream]);
        prop_assert_eq!(events.len(), 2);
        let is_mismatch = matches!(
            events[0],
            DecodeEvent::ChecksumMismatch { kind: k, .. } if k == kind
        );
        prop_assert!(is_mismatch);
        prop_assert_eq!(&events[1], &DecodeEvent::Frame(next));
    }

    #[test]
    fn chunking_invariance(
        parts in prop::collection::vec(
            prop_oneof![
                packet().prop_map(|p| encode_frame(&p)),
                prop::collection::vec(any::<u8>(), 0..16),
            ],
            0..12,
        ),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let stream: Vec<u8> = parts.concat();
        let whole = decode_chunks(&[&stream]);

        let bytewise: Vec<&[u8]> = stream.chunks(1).collect();
        prop_assert_eq!(&decode_chunks(&bytewise), &whole);

        if !stream.is_empty() {
            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(stream.len())).collect();
            points.sort_unstable();
            points.dedup();
            let mut chunks = Vec::new();
            let mut start = 0;
            for p in points {
                chunks.push(&stream[start..p]);
                start = p;
            }
            chunks.push(&stream[start..]);
            prop_assert_eq!(&decode_chunks(&chunks), &whole);
        }
    }

    #[test]
    fn dispatch_preserves_stream_order(packets in prop::collection::vec(packet(), 0..20)) {
        let stream: Vec<u8> = packets.iter().flat_map(encode_frame).collect();
        let (mut d, log) = recording_dispatcher();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&stream, |ev| if let DecodeEvent::Frame(p) = ev { d.publish(&p) });
        prop_assert_eq!(&*log.lock(), &packets);
    }
}

#[test]
fn frame_kinds_cover_every_magic() {
    for kind in FrameKind::ALL {
        assert_eq!(FrameKind::from_magic(kind.magic()), Some(kind));
    }
}
