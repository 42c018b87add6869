//! Criterion benchmarks for WebSocket frame serialization and decoding.
//!
//! Payload sizes straddle the 7-bit, 16-bit and 64-bit length encodings.
//! Serialization is measured both into one unbounded buffer and through
//! bounded chunks, the way a session feeds its write channel.

use bytes::{BufMut, BytesMut};
use criterion::{BenchmarkId, Criterion, Throughput, black_box};
use weft::websocket::{DEFAULT_MAX_FRAME_SIZE, Frame, Serializer, read_frame};

const PAYLOAD_SIZES: [usize; 4] = [16, 125, 4_096, 65_536];
const WRITE_CHUNK: usize = 8_192;

fn frames(len: usize) -> Vec<Frame> { (0..8).map(|_| Frame::binary(true, vec![0x5a; len])).collect() }

fn serialize_all(frames: &[Frame], chunk: Option<usize>) -> usize {
    let mut serializer = Serializer::new();
    for frame in frames {
        serializer.enqueue(frame.clone());
    }
    let mut written = 0;
    let mut buf = BytesMut::with_capacity(chunk.unwrap_or(0));
    while serializer.has_outstanding() {
        buf.clear();
        match chunk {
            Some(limit) => serializer.serialize(&mut (&mut buf).limit(limit)),
            None => serializer.serialize(&mut buf),
        }
        written += buf.len();
    }
    written
}

fn benchmark_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("websocket/serialize");

    for len in PAYLOAD_SIZES {
        let batch = frames(len);
        group.throughput(Throughput::Bytes((len * batch.len()) as u64));
        group.bench_with_input(BenchmarkId::new("unbounded", len), &batch, |b, batch| {
            b.iter(|| black_box(serialize_all(batch, None)));
        });
        group.bench_with_input(BenchmarkId::new("chunked", len), &batch, |b, batch| {
            b.iter(|| black_box(serialize_all(batch, Some(WRITE_CHUNK))));
        });
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("websocket/decode");

    for len in PAYLOAD_SIZES {
        let batch = frames(len);
        let mut serializer = Serializer::new();
        for frame in batch {
            serializer.enqueue(frame);
        }
        let mut wire = BytesMut::new();
        serializer.serialize(&mut wire);
        let wire = wire.freeze();

        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &wire, |b, wire| {
            b.iter(|| {
                let mut buf = BytesMut::from(&wire[..]);
                let mut decoded = 0;
                while let Ok(Some(frame)) = read_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE) {
                    decoded += frame.payload().len();
                }
                black_box(decoded)
            });
        });
    }

    group.finish();
}

/// Entrypoint for WebSocket framing benchmarks.
fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    benchmark_serialize(&mut criterion);
    benchmark_decode(&mut criterion);
    criterion.final_summary();
}
