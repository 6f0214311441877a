//! Benchmarks for Bubble network layout
//!
//! Measures per-frame cost of:
//! - One simulation tick (exact vs Barnes–Hut repulsion)
//! - Full settle runs
//! - Layer bucketing

use bubble_layout::{ForceConfig, LayerConfig, Layers, LayoutNode, Link, Simulation, SimulationConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn graph(n: usize) -> (Vec<LayoutNode>, Vec<Link>) {
    let nodes = (0..n)
        .map(|i| LayoutNode::new(format!("e{i}"), (i % 7) as f64))
        .collect();
    // Sparse ring plus a few chords
    let links = (0..n)
        .map(|i| Link::new(format!("e{i}"), format!("e{}", (i + 1) % n)))
        .chain((0..n / 5).map(|i| Link::new(format!("e{i}"), format!("e{}", (i * 7 + 3) % n))))
        .collect();
    (nodes, links)
}

/// Benchmark a single tick at different entity counts
fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for &count in &[20usize, 100, 500, 2_000] {
        let (nodes, links) = graph(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            let mut sim = Simulation::with_graph(SimulationConfig::seeded(1), nodes.clone(), links.clone());
            b.iter(|| {
                if sim.is_settled() {
                    sim.restart();
                }
                black_box(sim.tick())
            })
        });
    }
    group.finish();
}

/// Exact O(n²) repulsion against the octree at the same size
fn bench_repulsion_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("repulsion_mode");
    let (nodes, links) = graph(400);

    for (name, threshold) in [("exact", usize::MAX), ("barnes_hut", 0)] {
        let config = SimulationConfig::seeded(2).with_forces(ForceConfig {
            barnes_hut_threshold: threshold,
            ..ForceConfig::default()
        });
        group.bench_function(name, |b| {
            let mut sim = Simulation::with_graph(config.clone(), nodes.clone(), links.clone());
            b.iter(|| {
                if sim.is_settled() {
                    sim.restart();
                }
                black_box(sim.tick())
            })
        });
    }
    group.finish();
}

/// Benchmark a full run from cold start to settled
fn bench_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("settle");
    group.sample_size(10);

    for &count in &[20usize, 100] {
        let (nodes, links) = graph(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let mut sim =
                    Simulation::with_graph(SimulationConfig::seeded(3), nodes.clone(), links.clone());
                black_box(sim.run_to_settle(10_000))
            })
        });
    }
    group.finish();
}

/// Benchmark layer bucketing
fn bench_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket");
    let config = LayerConfig::default();

    for &count in &[100usize, 1_000, 10_000] {
        let (nodes, _) = graph(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &nodes, |b, nodes| {
            b.iter(|| Layers::bucket(black_box(nodes), &config))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tick, bench_repulsion_mode, bench_settle, bench_bucket);
criterion_main!(benches);
