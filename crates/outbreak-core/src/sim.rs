//! Simulation strategy and state types.
//!
//! The engine is parameterized by a [`SimulationStrategy`] that determines how
//! time advances. All strategies execute the same step; they differ only in
//! when `advance()` runs it.

use crate::fixed::{Fixed64, Steps};

// ---------------------------------------------------------------------------
// Simulation strategy
// ---------------------------------------------------------------------------

/// How the engine advances time. Chosen at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStrategy {
    /// Single step per call. The host calls `engine.step()` at its own cadence.
    Tick,

    /// The host calls `engine.advance(dt)` with elapsed seconds. Time is
    /// accumulated and one step runs per call once a whole interval is
    /// available, carrying the remainder forward.
    Delta {
        /// Host seconds per simulated day.
        step_interval: Fixed64,
    },
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Engine-owned clock state. Reset when the engine is reconfigured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimState {
    /// Completed steps (simulated days). Monotonic between reconfigures.
    pub steps_completed: Steps,

    /// Elapsed host seconds not yet consumed by a step. Unused in tick mode.
    pub accumulator: Fixed64,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Stocks and flows
// ---------------------------------------------------------------------------

/// Point-in-time compartment sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompartmentStocks {
    pub susceptible: Fixed64,
    pub bitten: Fixed64,
    pub zombie: Fixed64,
}

impl CompartmentStocks {
    /// Everyone who is not a zombie.
    pub fn non_zombie(&self) -> Fixed64 {
        self.susceptible.saturating_add(self.bitten)
    }
}

/// Intermediate quantities of one step, in computation order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepFlows {
    /// Susceptible plus bitten, before the step.
    pub non_zombie_population: Fixed64,
    /// Density-curve multiplier applied to the normal bite rate.
    pub density_effect: Fixed64,
    /// Whole bites delivered by all zombies this day.
    pub total_bites: Fixed64,
    /// Bites landing on susceptible people, after the floor clamp and before
    /// the capacity limit.
    pub getting_bitten: Fixed64,
    /// Bites admitted into incubation.
    pub accepted: Fixed64,
    /// `getting_bitten - accepted`: bites lost to the capacity limit.
    pub dropped: Fixed64,
    /// People released by matured cohorts.
    pub raw_outflow: Fixed64,
    /// `raw_outflow * conversion`: new zombies.
    pub becoming_infected: Fixed64,
}

/// The result of one completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Step number (1-based day) that this report closes.
    pub step: Steps,
    pub flows: StepFlows,
    /// Stocks as reported after the step.
    pub stocks: CompartmentStocks,
}

// ---------------------------------------------------------------------------
// Advance result
// ---------------------------------------------------------------------------

/// Result of an `Engine::advance()` call.
#[derive(Debug, Default)]
pub struct AdvanceResult {
    /// Number of simulation steps actually executed.
    pub steps_run: u64,

    /// One report per executed step, oldest first.
    pub reports: Vec<StepReport>,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for divergence detection.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
