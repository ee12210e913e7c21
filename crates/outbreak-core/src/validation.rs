//! Validation tools for state comparison and determinism checking.
//!
//! Provides utilities for comparing two engine states to find divergences,
//! and for validating that a configuration produces the same trajectory when
//! run twice.

use crate::config::{ConfigError, SimulationConfig};
use crate::engine::Engine;
use crate::fixed::{Fixed64, Steps};
use crate::reconciler::HealthState;
use crate::sim::SimulationStrategy;

// ---------------------------------------------------------------------------
// State diff types
// ---------------------------------------------------------------------------

/// A compartment whose value differs between two engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDiff {
    pub compartment: &'static str,
    pub a: Fixed64,
    pub b: Fixed64,
}

/// A tracked pool whose membership differs between two engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDiff {
    pub pool: HealthState,
    pub a_len: usize,
    pub b_len: usize,
}

/// Per-subsystem match results.
#[derive(Debug, Clone)]
pub struct SubsystemDiff {
    pub stocks_match: bool,
    pub conveyor_matches: bool,
    pub modules_match: bool,
    pub rng_matches: bool,
    pub sim_state_matches: bool,
}

impl SubsystemDiff {
    pub fn all_match(&self) -> bool {
        self.stocks_match
            && self.conveyor_matches
            && self.modules_match
            && self.rng_matches
            && self.sim_state_matches
    }
}

/// Full state diff between two engines.
#[derive(Debug, Clone)]
pub struct StateDiff {
    pub is_identical: bool,
    pub subsystem_diffs: SubsystemDiff,
    pub stock_diffs: Vec<StockDiff>,
    pub pool_diffs: Vec<PoolDiff>,
}

// ---------------------------------------------------------------------------
// Quick compare (subsystem-level only)
// ---------------------------------------------------------------------------

/// Quick subsystem-level comparison using hashes.
pub fn quick_compare(a: &Engine, b: &Engine) -> SubsystemDiff {
    let ha = a.subsystem_hashes();
    let hb = b.subsystem_hashes();

    SubsystemDiff {
        stocks_match: ha.stocks == hb.stocks,
        conveyor_matches: ha.conveyor == hb.conveyor,
        modules_match: ha.modules == hb.modules,
        rng_matches: ha.rng == hb.rng,
        sim_state_matches: ha.sim_state == hb.sim_state,
    }
}

// ---------------------------------------------------------------------------
// Full diff
// ---------------------------------------------------------------------------

/// Compute a detailed diff between two engine states.
pub fn diff_engines(a: &Engine, b: &Engine) -> StateDiff {
    let subsystem_diffs = quick_compare(a, b);

    let sa = a.stocks();
    let sb = b.stocks();
    let stock_diffs: Vec<StockDiff> = [
        ("susceptible", sa.susceptible, sb.susceptible),
        ("bitten", sa.bitten, sb.bitten),
        ("zombie", sa.zombie, sb.zombie),
    ]
    .into_iter()
    .filter(|(_, va, vb)| va != vb)
    .map(|(compartment, a, b)| StockDiff { compartment, a, b })
    .collect();

    let mut pool_diffs = Vec::new();
    let pools_a = a.reconciler().map(|r| r.pools());
    let pools_b = b.reconciler().map(|r| r.pools());
    for pool in HealthState::ALL {
        let members_a = pools_a.map(|p| p.members(pool)).unwrap_or(&[]);
        let members_b = pools_b.map(|p| p.members(pool)).unwrap_or(&[]);
        let mut sorted_a = members_a.to_vec();
        let mut sorted_b = members_b.to_vec();
        sorted_a.sort();
        sorted_b.sort();
        if sorted_a != sorted_b {
            pool_diffs.push(PoolDiff {
                pool,
                a_len: sorted_a.len(),
                b_len: sorted_b.len(),
            });
        }
    }

    let is_identical =
        stock_diffs.is_empty() && pool_diffs.is_empty() && subsystem_diffs.all_match();

    StateDiff {
        is_identical,
        subsystem_diffs,
        stock_diffs,
        pool_diffs,
    }
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

/// Result of a determinism validation run.
#[derive(Debug)]
pub struct DeterminismResult {
    /// Whether the two runs produced identical results.
    pub is_deterministic: bool,
    /// Step at which divergence was first detected (if any).
    pub divergence_step: Option<Steps>,
    /// Hash log: (step, hash_run1, hash_run2) for each step.
    pub hash_log: Vec<(Steps, u64, u64)>,
}

/// Run the same configuration on two fresh engines for `steps` steps and
/// compare their state hashes after every step.
pub fn validate_determinism(
    config: &SimulationConfig,
    steps: Steps,
) -> Result<DeterminismResult, ConfigError> {
    let mut engine_a = Engine::new(config)?.with_strategy(SimulationStrategy::Tick);
    let mut engine_b = Engine::new(config)?.with_strategy(SimulationStrategy::Tick);

    let mut hash_log = Vec::new();
    let mut divergence_step = None;

    for _ in 0..steps {
        engine_a.step();
        engine_b.step();

        let hash_a = engine_a.state_hash();
        let hash_b = engine_b.state_hash();
        let step = engine_a.steps_completed();
        hash_log.push((step, hash_a, hash_b));

        if hash_a != hash_b && divergence_step.is_none() {
            divergence_step = Some(step);
        }
    }

    Ok(DeterminismResult {
        is_deterministic: divergence_step.is_none(),
        divergence_step,
        hash_log,
    })
}
