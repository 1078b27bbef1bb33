// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmarks for the refinement checker (§4.6) at varying skeleton sizes.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::collections::BTreeSet;

use trt_core::skeleton::Skeleton;
use trt_core::spec::{RefinementConfig, RefinementMode};
use trt_refinement::check;

fn make_skeleton(len: usize, extra_every: usize) -> Skeleton {
    let mut calls = Vec::with_capacity(len);
    let mut seq = 1i64;
    for i in 0..len {
        if extra_every > 0 && i % extra_every == 0 {
            calls.push((seq, "log_event".to_string()));
            seq += 1;
        }
        calls.push((seq, format!("tool_{}", i % 5)));
        seq += 1;
    }
    Skeleton { calls }
}

fn bench_refinement_by_skeleton_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("refinement_by_skeleton_size");
    let cfg = RefinementConfig {
        mode: RefinementMode::Skeleton,
        allow_extra_tools: BTreeSet::from(["log_event".to_string()]),
        ..RefinementConfig::default()
    };
    let write_tools = BTreeSet::new();

    for size in [10, 100, 1000] {
        let baseline = make_skeleton(size, 0);
        let candidate = make_skeleton(size, 4);
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &(baseline, candidate),
            |b, (base, cand)| {
                b.iter(|| {
                    check(
                        black_box(base),
                        black_box(cand),
                        black_box(&cfg),
                        black_box(&write_tools),
                        black_box(i64::MAX),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_refinement_exact_match(c: &mut Criterion) {
    let cfg = RefinementConfig {
        mode: RefinementMode::Strict,
        ..RefinementConfig::default()
    };
    let write_tools = BTreeSet::new();
    let skeleton = make_skeleton(500, 0);

    c.bench_function("refinement_strict_exact_match_500", |b| {
        b.iter(|| {
            check(
                black_box(&skeleton),
                black_box(&skeleton),
                black_box(&cfg),
                black_box(&write_tools),
                black_box(i64::MAX),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_refinement_by_skeleton_size,
    bench_refinement_exact_match,
);
criterion_main!(benches);
