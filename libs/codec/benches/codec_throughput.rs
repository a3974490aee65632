//! Writer and reader throughput
//!
//! Measures the hot path a node runs per request: build a small response
//! into a reused buffer, then walk it back and pull one element out.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rrlite_codec::{
    EntryHeader, MessageHeader, MessageReader, MessageWriter, ScatterGatherBuffer,
    ScatterGatherBufferMut,
};
use rrlite_types::{EntryType, NodeId};

fn write_response(raw: &mut [u8]) -> usize {
    let len = raw.len();
    let header = MessageHeader {
        sender_nodeid: NodeId::from_bytes([3; 16]),
        sender_nodename: "bench".into(),
        ..Default::default()
    };
    let writer = MessageWriter::init(ScatterGatherBufferMut::single(raw), 0, len).unwrap();
    let mut entries = writer.begin_message(&header).unwrap();
    let mut elements = entries
        .begin_entry(&EntryHeader::new(EntryType::FunctionCallRes, "svc", "add", 1))
        .unwrap();
    elements.write_scalar("return", black_box(3.0f64)).unwrap();
    elements.write_array("samples", &[0i32; 32]).unwrap();
    elements.end_entry().unwrap();
    entries.end_message().unwrap().message_size
}

fn bench_write(c: &mut Criterion) {
    let mut raw = vec![0u8; 4096];
    c.bench_function("write_response", |b| b.iter(|| write_response(&mut raw)));
}

fn bench_read(c: &mut Criterion) {
    let mut raw = vec![0u8; 4096];
    let size = write_response(&mut raw);
    c.bench_function("find_and_read_scalar", |b| {
        b.iter(|| {
            let reader =
                MessageReader::init(ScatterGatherBuffer::single(black_box(&raw)), 0, size).unwrap();
            let entry = reader.begin_entries().unwrap();
            entry.find_element("return").unwrap().read_scalar::<f64>().unwrap()
        })
    });

    let (a, b) = raw[..size].split_at(size / 2);
    let spans: [&[u8]; 2] = [a, b];
    c.bench_function("find_and_read_scalar_split", |bench| {
        bench.iter(|| {
            let reader = MessageReader::init(ScatterGatherBuffer::vectored(&spans), 0, size).unwrap();
            let entry = reader.begin_entries().unwrap();
            entry.find_element("return").unwrap().read_scalar::<f64>().unwrap()
        })
    });
}

criterion_group!(benches, bench_write, bench_read);
criterion_main!(benches);
