//! Shared test helpers for unit and integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests and, via the `test-utils` feature, to other
//! crates' tests.

use crate::config::{CalibrationRow, OverflowPolicy, SimulationConfig, TrackingConfig};
use crate::engine::Engine;
use crate::fixed::Fixed64;
use crate::sim::SimulationStrategy;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Configurations
// ===========================================================================

/// The reference outbreak: 100 people on 1000 m^2, one zombie, 15 days of
/// incubation, room for 100 bitten, no density calibration.
pub fn scenario_config() -> SimulationConfig {
    SimulationConfig::default()
}

/// 100 people on 200 m^2 with a normal density of 0.5, so the relative
/// density of the first step is exactly 1.
pub fn exact_density_config() -> SimulationConfig {
    SimulationConfig {
        land_area: 200.0,
        normal_population_density: 0.5,
        ..SimulationConfig::default()
    }
}

/// A crowding curve that raises the bite rate with density.
pub fn crowding_curve() -> Vec<CalibrationRow> {
    vec![
        CalibrationRow { x: 0.0, y: 0.0 },
        CalibrationRow { x: 0.5, y: 0.5 },
        CalibrationRow { x: 1.0, y: 1.0 },
        CalibrationRow { x: 2.0, y: 3.0 },
    ]
}

/// Tracked population on a `width x height` grid with one seed zombie.
pub fn tracked_config(width: u32, height: u32, seed: u64) -> SimulationConfig {
    SimulationConfig {
        susceptible: (width as u64 * height as u64) as f64,
        seed,
        overflow_policy: OverflowPolicy::RemainSusceptible,
        tracking: Some(TrackingConfig {
            grid_width: width,
            grid_height: height,
        }),
        ..SimulationConfig::default()
    }
}

// ===========================================================================
// Engines
// ===========================================================================

/// Engine in tick mode, so `advance` and `step` both run exactly one step.
pub fn tick_engine(config: &SimulationConfig) -> Engine {
    match Engine::new(config) {
        Ok(engine) => engine.with_strategy(SimulationStrategy::Tick),
        Err(e) => panic!("test config rejected: {e}"),
    }
}

/// Run `steps` steps.
pub fn run_steps(engine: &mut Engine, steps: u64) {
    for _ in 0..steps {
        engine.step();
    }
}
