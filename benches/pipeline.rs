//! Hot-path benchmarks: header codec, sample ring, packet queue

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use opuscast::buffer::SampleRing;
use opuscast::protocol::{HostAudioFormat, SessionConfig};
use opuscast::queue::PacketQueue;

fn bench_header(c: &mut Criterion) {
    let config = SessionConfig::from_host(HostAudioFormat {
        sample_rate: 48_000,
        channels: 2,
    });
    let header = config.encode();

    c.bench_function("header_encode", |b| b.iter(|| black_box(config).encode()));
    c.bench_function("header_decode", |b| {
        b.iter(|| SessionConfig::decode(black_box(&header)).unwrap())
    });
}

fn bench_sample_ring(c: &mut Criterion) {
    let ring = SampleRing::<f32>::new(1 << 16);
    let frame = vec![0.5f32; 1920];
    let mut out = vec![0.0f32; 1920];

    c.bench_function("ring_write_read_frame", |b| {
        b.iter(|| {
            ring.write(black_box(&frame));
            ring.read_into(black_box(&mut out))
        })
    });
}

fn bench_packet_queue(c: &mut Criterion) {
    let queue = PacketQueue::new(100);
    let packet = Bytes::from(vec![0u8; 200]);

    c.bench_function("queue_push_pop", |b| {
        b.iter(|| {
            queue.push(black_box(packet.clone()));
            queue.try_pop()
        })
    });
}

criterion_group!(benches, bench_header, bench_sample_ring, bench_packet_queue);
criterion_main!(benches);
