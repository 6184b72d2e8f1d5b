/* Measures stream decoding throughput for a mixed inbound stream (status frames,
acks and line noise) fed in serial-read-sized chunks, plus the per-tick cost of
encoding the joystick packet on the transmit path. */
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use pendulum_link::link::{
    codec::{Command, Gains, JoystickState, Packet, Sample, encode_command, encode_frame},
    decoder::{DecodeEvent, FrameDecoder},
};

use std::hint::black_box;

fn mixed_stream(frames: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for tick in 0..frames {
        let sample = Sample {
            tick,
            degree: 180.0 + (tick as f64 * 0.05).sin() * 10.0,
            cm_x: (tick as f64 * 0.01).cos(),
            ..Sample::default()
        };
        out.extend(encode_frame(&Packet::ControlStatus(sample)));
        if tick % 50 == 0 {
            out.extend(encode_frame(&Packet::GainsAck(Gains::default())));
            out.extend([0x00, 0x13, 0xAA, 0x42]);
        }
    }
    out
}

fn bench_decoder(c: &mut Criterion) {
    let stream = mixed_stream(1000);
    let mut group = c.benchmark_group("frame_decoder");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("decode_mixed_128b_chunks", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut frames = 0usize;
            for chunk in stream.chunks(128) {
                decoder.feed(black_box(chunk), |ev| {
                    if let DecodeEvent::Frame(p) = ev {
                        black_box(p);
                        frames += 1;
                    }
                });
            }
            black_box(frames)
        });
    });
    group.finish();
}

fn bench_encode_joystick(c: &mut Criterion) {
    let js = JoystickState {
        axis_x: 1200,
        axis_y: -800,
        ..JoystickState::default()
    };
    let mut seq = 0u8;
    c.bench_function("encode_joystick_packet", |b| {
        b.iter(|| {
            let bytes = encode_command(black_box(&Command::Joystick(js)), seq);
            seq = seq.wrapping_add(1);
            black_box(bytes)
        });
    });
}

criterion_group!(benches, bench_decoder, bench_encode_joystick);
criterion_main!(benches);
