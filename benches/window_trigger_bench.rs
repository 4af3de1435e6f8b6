// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use nebula_execution_core::windowing::{AggregateValue, AggregationKind, GroupKey, WindowOperatorHandler};

fn populate(handler: &WindowOperatorHandler, num_keys: u64, events_per_key: u64) {
    for key in 0..num_keys {
        for i in 0..events_per_key {
            handler.ingest(GroupKey::Int(key as i64), i as i64, AggregateValue::I64(1));
        }
    }
}

fn bench_tumbling_trigger(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_trigger");
    for num_keys in [10u64, 1_000u64] {
        group.throughput(Throughput::Elements(num_keys));
        group.bench_function(format!("tumbling_sum/{num_keys}_keys"), |b| {
            b.iter_batched(
                || {
                    let handler = WindowOperatorHandler::new(100, 100, AggregationKind::Sum);
                    populate(&handler, num_keys, 50);
                    handler
                },
                |handler| handler.on_watermark_advance(5_000),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_sliding_trigger(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_trigger");
    group.throughput(Throughput::Elements(200));
    group.bench_function("sliding_sum/200_keys_4x_overlap", |b| {
        b.iter_batched(
            || {
                let handler = WindowOperatorHandler::new(1000, 250, AggregationKind::Sum);
                populate(&handler, 200, 20);
                handler
            },
            |handler| handler.on_watermark_advance(10_000),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_tumbling_trigger, bench_sliding_trigger);
criterion_main!(benches);
