//! Benchmarks for Bubble geometry
//!
//! Measures per-frame cost of:
//! - Isometric project / unproject
//! - Deterministic arrangements for idle layers

use bubble_geometry::{Arrangement, Isometric, Projection, ScreenPoint};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Benchmark projecting a full frame of entities
fn bench_project_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("isometric_project");
    let iso = Isometric::new(1920.0, 1080.0).unwrap();

    for &count in &[20usize, 200, 2_000, 20_000] {
        let points: Vec<(f64, f64)> = (0..count)
            .map(|i| ((i as f64).sin() * 500.0, (i as f64).cos() * 500.0))
            .collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &points, |b, pts| {
            b.iter(|| {
                for &(x, y) in pts {
                    black_box(iso.project(black_box(x), black_box(y)));
                }
            })
        });
    }
    group.finish();
}

/// Benchmark hit-test inversion
fn bench_unproject(c: &mut Criterion) {
    let iso = Isometric::new(1920.0, 1080.0).unwrap();
    c.bench_function("isometric_unproject", |b| {
        b.iter(|| iso.unproject(black_box(ScreenPoint::new(1234.5, 678.9))))
    });
}

/// Benchmark idle-layer arrangement generation
fn bench_arrangements(c: &mut Criterion) {
    let mut group = c.benchmark_group("arrangement");
    let arrangements = [
        ("ring", Arrangement::Ring { radius: 300.0 }),
        ("circle", Arrangement::Circle { radius: 10.0 }),
        ("spiral", Arrangement::Spiral),
        ("grid", Arrangement::Grid { spacing: 3.0 }),
        ("random", Arrangement::Random { seed: 7 }),
    ];
    for (name, arrangement) in arrangements {
        group.bench_function(name, |b| b.iter(|| black_box(arrangement.positions(black_box(200)))));
    }
    group.finish();
}

criterion_group!(benches, bench_project_frame, bench_unproject, bench_arrangements);
criterion_main!(benches);
