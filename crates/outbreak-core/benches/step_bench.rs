//! Criterion benchmarks for the outbreak step.
//!
//! - `aggregate`: stock-flow arithmetic only, with a long calibration table
//! - `tracked`: the same step plus entity reconciliation on large grids

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use outbreak_core::config::{CalibrationRow, SimulationConfig};
use outbreak_core::engine::Engine;
use outbreak_core::test_utils::*;

/// A smooth, dense density-effect table.
fn dense_curve(points: usize) -> Vec<CalibrationRow> {
    (0..points)
        .map(|i| {
            let x = i as f64 * 0.01;
            CalibrationRow { x, y: x * x }
        })
        .collect()
}

/// Engine warmed up until incubation is running at capacity.
fn warmed(config: &SimulationConfig) -> Engine {
    let mut engine = tick_engine(config);
    run_steps(&mut engine, 5);
    engine
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    let config = SimulationConfig {
        susceptible: 1_000_000.0,
        zombie: 50.0,
        land_area: 10_000_000.0,
        bitten_capacity: 100_000.0,
        calibration: dense_curve(1000),
        ..scenario_config()
    };
    group.bench_function("step_1000_point_curve", |b| {
        b.iter_batched(
            || warmed(&config),
            |mut engine| {
                engine.step();
            },
            BatchSize::SmallInput,
        );
    });

    let mut engine = warmed(&scenario_config());
    group.bench_function("step_reference", |b| {
        b.iter(|| {
            engine.step();
        });
    });

    group.finish();
}

fn bench_tracked(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracked");
    group.sample_size(30);

    for side in [100u32, 300] {
        let config = SimulationConfig {
            zombie: 20.0,
            bitten_capacity: 5_000.0,
            land_area: (side as f64) * (side as f64) * 10.0,
            ..tracked_config(side, side, 7)
        };
        group.bench_function(format!("step_{side}x{side}_grid"), |b| {
            b.iter_batched(
                || warmed(&config),
                |mut engine| {
                    engine.step();
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_tracked);
criterion_main!(benches);
