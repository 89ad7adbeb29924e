//! Benchmarks for the generation stages.
//!
//! Measures the Voronoi kernel, graph extraction with periodic consolidation, and a fixed
//! number of annealing iterations on a consolidated network. Seed points are drawn from
//! `FIBERNET_SEED` (decimal or 0x-hex, default 0xF1B3) so runs are comparable.

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fibernet::core::algorithms::consolidation::{ConsolidationConfig, consolidate_periodic};
use fibernet::core::algorithms::extraction::{ExtractionConfig, extract_network};
use fibernet::core::annealing::{AnnealingConfig, MovePolicy, anneal};
use fibernet::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;
use std::sync::OnceLock;

const SEED_COUNTS: &[usize] = &[25, 50, 100];

/// Reads `FIBERNET_SEED` once. Prints it if `PRINT_BENCH_SEED` is set.
fn benchmark_seed() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    *SEED.get_or_init(|| {
        let seed = std::env::var("FIBERNET_SEED")
            .ok()
            .and_then(|s| {
                let s = s.trim();
                s.strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .map_or_else(|| s.parse().ok(), |hex| u64::from_str_radix(hex, 16).ok())
            })
            .unwrap_or(0xF1B3);
        if std::env::var("PRINT_BENCH_SEED").is_ok() {
            eprintln!("Benchmark seed: 0x{seed:X} ({seed})");
        }
        seed
    })
}

fn domain() -> PeriodicBox {
    PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap()
}

fn seeds(n: usize) -> Vec<Point3> {
    generate_seed_points_seeded(&domain(), n, benchmark_seed()).unwrap()
}

fn consolidated(n: usize) -> FiberNetwork {
    let domain = domain();
    let cells = PeriodicVoronoiKernel::default()
        .compute_cells(&domain, &seeds(n))
        .unwrap();
    let (mut network, _) = extract_network(&cells, &domain, &ExtractionConfig::default());
    consolidate_periodic(&mut network, &domain, &ConsolidationConfig::default());
    network
}

fn bench_voronoi_kernel(c: &mut Criterion) {
    let domain = domain();
    let kernel = PeriodicVoronoiKernel::default();
    let mut group = c.benchmark_group("voronoi_kernel");
    group.sample_size(20);
    for &n in SEED_COUNTS {
        let points = seeds(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| black_box(kernel.compute_cells(&domain, points).unwrap()));
        });
    }
    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let domain = domain();
    let mut group = c.benchmark_group("extract_and_consolidate");
    group.sample_size(20);
    for &n in SEED_COUNTS {
        let cells = PeriodicVoronoiKernel::default()
            .compute_cells(&domain, &seeds(n))
            .unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &cells, |b, cells| {
            b.iter(|| {
                let (mut network, _) = extract_network(cells, &domain, &ExtractionConfig::default());
                consolidate_periodic(&mut network, &domain, &ConsolidationConfig::default());
                black_box(network)
            });
        });
    }
    group.finish();
}

fn bench_annealing(c: &mut Criterion) {
    let domain = domain();
    let network = consolidated(50);
    let mut group = c.benchmark_group("anneal_500_iterations");
    group.sample_size(10);
    let policies = [
        ("relocation", MovePolicy::RelocationOnly),
        (
            "mixed",
            MovePolicy::Mixed {
                recombination_probability: 0.2,
            },
        ),
    ];
    for (name, move_policy) in policies {
        let config = AnnealingConfig {
            max_iterations: 500,
            move_policy,
            ..AnnealingConfig::default()
        };
        group.bench_function(name, |b| {
            b.iter_with_setup(
                || (network.clone(), StdRng::seed_from_u64(benchmark_seed())),
                |(mut network, mut rng)| {
                    black_box(anneal(&mut network, &domain, &config, &mut rng).unwrap())
                },
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_voronoi_kernel,
    bench_extraction,
    bench_annealing
);
criterion_main!(benches);
