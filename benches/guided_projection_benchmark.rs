//! Benchmarks for the guided projection iteration.
//!
//! Run with: cargo bench
//!
//! To compare against baseline:
//! 1. First run: cargo bench -- --save-baseline main
//! 2. After changes: cargo bench -- --baseline main

use std::f64::consts::TAU;

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use guided_projection::constraints::CoherentLength;
use guided_projection::core::ConstraintStrategy;
use guided_projection::energies::Fairness;
use guided_projection::{GuidedProjection, GuidedProjectionConfig};

// =============================================================================
// Problem Generation
// =============================================================================

/// Noisy closed ring with edge-length constraints and fairness energies
fn create_ring(n: usize, parallel: bool) -> GuidedProjection {
    let config = GuidedProjectionConfig::new()
        .with_max_iterations(20)
        .with_parallel(parallel);
    let mut solver = GuidedProjection::with_config(config);

    let points = solver.register_variable_set(n, 3).unwrap();
    let lengths = solver.register_variable_set(n, 1).unwrap();
    let edge_length = 2.0 * (TAU / (2.0 * n as f64)).sin();

    for i in 0..n {
        let angle = TAU * i as f64 / n as f64;
        let radius = 1.0 + 0.05 * (7.3 * i as f64).sin();
        solver
            .set_variable_value(
                points.at(i),
                &[radius * angle.cos(), radius * angle.sin(), 0.02 * (3.1 * i as f64).cos()],
            )
            .unwrap();
        solver.set_variable_value(lengths.at(i), &[edge_length]).unwrap();
        solver.fix_variable(lengths.at(i)).unwrap();
    }

    let coherent = solver.add_constraint_set(
        "edge length",
        ConstraintStrategy::quadratic(CoherentLength::new()),
    );
    for i in 0..n {
        let edge = [points.at(i), points.at((i + 1) % n), lengths.at(i)];
        solver.add_constraint(coherent, &edge, None, 1.0).unwrap();
    }
    for component in 0..3 {
        let fairness = solver.add_energy_set("fairness", Fairness::new(3, component).unwrap());
        for i in 0..n {
            solver
                .add_energy(
                    fairness,
                    &[points.at(i), points.at((i + 1) % n), points.at((i + 2) % n)],
                    0.01,
                )
                .unwrap();
        }
    }
    solver
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("Iterate");
    group.sample_size(20);

    for n in [16, 64, 256] {
        group.throughput(Throughput::Elements(n as u64));
        for (label, parallel) in [("serial", false), ("parallel", true)] {
            group.bench_with_input(BenchmarkId::new(label, n), &n, |b, &n| {
                b.iter_batched(
                    || create_ring(n, parallel),
                    |mut solver| black_box(solver.iterate(20, 1e-12).unwrap()),
                    BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_iterate);
criterion_main!(benches);
