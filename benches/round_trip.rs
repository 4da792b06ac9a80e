//! Benchmarks for encoding and decoding object graphs.
//!
//! Run with: cargo bench --bench round_trip

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graph_serde::{ClassRegistry, Decoder, Encoder, Record, Value};

/// A list of `count` records where every record points at a shared parent
/// and at its predecessor.
fn build_chain(count: usize) -> Value {
    let parent = Value::record(Record::new("Parent").with_field("name", "root"));
    let mut previous = Value::Null;
    let items: Vec<Value> = (0..count)
        .map(|i| {
            let node = Value::record(
                Record::new("Node")
                    .with_field("index", i as u32)
                    .with_field("parent", parent.clone())
                    .with_field("previous", previous.clone()),
            );
            previous = node.clone();
            node
        })
        .collect();
    Value::array(items)
}

/// A balanced tree with no sharing.
fn build_tree(depth: usize) -> Value {
    if depth == 0 {
        return Value::from("leaf");
    }
    Value::record(
        Record::new("Node")
            .with_field("left", build_tree(depth - 1))
            .with_field("right", build_tree(depth - 1)),
    )
}

fn bench_round_trip(c: &mut Criterion) {
    let mut registry = ClassRegistry::new();
    registry.register_all(["Parent", "Node"]);
    let encoder = Encoder::new(&registry);
    let decoder = Decoder::new(&registry);

    let mut group = c.benchmark_group("shared_chain");
    for count in [100, 1_000, 5_000] {
        let graph = build_chain(count);
        let wire = encoder.encode(&graph).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", count), &count, |b, _| {
            b.iter(|| encoder.encode(black_box(&graph)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decode", count), &count, |b, _| {
            b.iter(|| decoder.decode(black_box(&wire)).unwrap());
        });
    }
    group.finish();

    let mut group = c.benchmark_group("tree");
    for depth in [6, 10, 12] {
        let graph = build_tree(depth);
        let wire = encoder.encode(&graph).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", depth), &depth, |b, _| {
            b.iter(|| encoder.encode(black_box(&graph)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decode", depth), &depth, |b, _| {
            b.iter(|| decoder.decode(black_box(&wire)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_round_trip);
criterion_main!(benches);
