//! The simulation engine: owns the compartment stocks and the incubation
//! conveyor and runs the daily step.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - The validated [`ModelParams`] and the [`DensityResponseCurve`]
//! - [`CompartmentStocks`] and the [`IncubationConveyor`]
//! - A [`SimState`] (step counter, accumulator) and a [`SimulationStrategy`]
//! - A [`SimRng`] shared by every module draw
//! - An [`EventBus`] and the registered [`Module`]s, including the
//!   [`AgentReconciler`] when tracking is configured
//!
//! # Step pipeline
//!
//! Each step runs:
//! 1. **Flows** -- infection pressure, bites, conveyor aging/drain/inflow,
//!    new stocks
//! 2. **Modules** -- registered modules see the flows (the reconciler moves
//!    entities); tracked populations become the reported stocks
//! 3. **Events** -- aggregate events are emitted and everything buffered
//!    during the step is delivered
//! 4. **Bookkeeping** -- step counter, report, per-day log line

use std::fmt;

use crate::config::{ConfigError, ModelParams, OverflowPolicy, SimulationConfig, TrackingConfig, ValidatedConfig};
use crate::conveyor::IncubationConveyor;
use crate::curve::DensityResponseCurve;
use crate::event::{Event, EventBus, EventKind, PassiveListener};
use crate::fixed::{Fixed64, Steps, saturating_div_64, truncate_to_count};
use crate::id::EntityId;
use crate::module::{Module, ModuleContext, PopulationCounts};
use crate::reconciler::{AgentReconciler, HealthState, KillCounters};
use crate::rng::SimRng;
use crate::sim::{AdvanceResult, CompartmentStocks, SimState, SimulationStrategy, StateHash, StepFlows, StepReport};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The core simulation engine.
#[derive(Debug)]
pub struct Engine {
    params: ModelParams,
    curve: DensityResponseCurve,
    conveyor: IncubationConveyor,
    stocks: CompartmentStocks,

    /// Simulation strategy (tick or delta).
    pub(crate) strategy: SimulationStrategy,

    /// Simulation state (step counter, accumulator).
    pub sim_state: SimState,

    /// Whether the simulation is paused.
    pub(crate) paused: bool,

    rng: SimRng,
    tracking: Option<TrackingConfig>,

    /// `getting_bitten` of the most recent step, before the capacity clip.
    last_bites_on_susceptible: Fixed64,
    last_report: Option<StepReport>,

    /// Typed event bus for simulation events.
    pub event_bus: EventBus,

    /// Registered simulation modules. The reconciler, when present, is first.
    pub(crate) modules: Vec<Box<dyn Module>>,
}

impl Engine {
    /// Validate `config` and build an engine in delta mode, stepping once per
    /// `step_interval_seconds`.
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let validated = config.validate()?;
        let mut engine = Self {
            params: validated.params.clone(),
            curve: validated.curve.clone(),
            conveyor: IncubationConveyor::new(),
            stocks: validated.initial,
            strategy: SimulationStrategy::Delta {
                step_interval: validated.step_interval,
            },
            sim_state: SimState::new(),
            paused: false,
            rng: SimRng::new(validated.seed),
            tracking: None,
            last_bites_on_susceptible: Fixed64::ZERO,
            last_report: None,
            event_bus: EventBus::default(),
            modules: Vec::new(),
        };
        engine.apply(validated);
        Ok(engine)
    }

    /// Replace the simulation strategy.
    pub fn with_strategy(mut self, strategy: SimulationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate `config` and, only if it is valid, restart the simulation
    /// from it. Conveyor, stocks, pools, kill counters, RNG, accumulator and
    /// step counter are reset. Listeners and host modules are kept.
    pub fn reconfigure(&mut self, config: &SimulationConfig) -> Result<(), ConfigError> {
        let validated = config.validate()?;
        self.apply(validated);
        log::debug!("engine reconfigured");
        Ok(())
    }

    fn apply(&mut self, validated: ValidatedConfig) {
        self.modules
            .retain(|m| !m.as_any().is::<AgentReconciler>());
        if let Some(tracking) = &validated.tracking {
            let zombies = truncate_to_count(validated.initial.zombie);
            self.modules
                .insert(0, Box::new(AgentReconciler::from_tracking(tracking, zombies)));
        }
        if let SimulationStrategy::Delta { step_interval } = &mut self.strategy {
            *step_interval = validated.step_interval;
        }

        self.params = validated.params;
        self.curve = validated.curve;
        self.conveyor.clear();
        self.stocks = validated.initial;
        self.sim_state = SimState::new();
        self.rng = SimRng::new(validated.seed);
        self.tracking = validated.tracking;
        self.last_bites_on_susceptible = Fixed64::ZERO;
        self.last_report = None;
        self.event_bus.clear_all();
        self.sync_stocks_from_population();
    }

    // -----------------------------------------------------------------------
    // Modules
    // -----------------------------------------------------------------------

    /// Register a module. Modules run in registration order after the
    /// reconciler.
    pub fn register_module(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn get_module(&self, index: usize) -> Option<&dyn Module> {
        self.modules.get(index).map(|m| m.as_ref())
    }

    pub fn get_module_mut(&mut self, index: usize) -> Option<&mut Box<dyn Module>> {
        self.modules.get_mut(index)
    }

    /// The agent reconciler, if tracking is configured.
    pub fn reconciler(&self) -> Option<&AgentReconciler> {
        self.modules
            .iter()
            .find_map(|m| m.as_any().downcast_ref::<AgentReconciler>())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Suppress an event kind.
    pub fn suppress_event(&mut self, kind: EventKind) {
        self.event_bus.suppress(kind);
    }

    /// Register a passive listener for an event kind.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.event_bus.on_passive(kind, listener);
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Pause the simulation. While paused, `advance()` and `step()` run
    /// nothing and elapsed time is not accumulated.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance the simulation.
    ///
    /// In tick mode, runs exactly one step and ignores `dt`. In delta mode,
    /// adds `dt` seconds to the accumulator and runs one step once a whole
    /// interval has accumulated, keeping the residual. At most one step runs
    /// per call; a backlog drains one step per later call. A non-positive
    /// `dt` is ignored.
    pub fn advance(&mut self, dt: Fixed64) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if self.paused {
            return result;
        }

        match self.strategy {
            SimulationStrategy::Tick => {
                self.step_internal(&mut result);
            }
            SimulationStrategy::Delta { step_interval } => {
                if dt <= Fixed64::ZERO {
                    return result;
                }
                let step_size = step_interval.max(Fixed64::DELTA);
                self.sim_state.accumulator = self.sim_state.accumulator.saturating_add(dt);
                if self.sim_state.accumulator >= step_size {
                    self.sim_state.accumulator -= step_size;
                    self.step_internal(&mut result);
                }
            }
        }

        result
    }

    /// Run exactly one step, whatever the strategy. The accumulator is not
    /// touched.
    pub fn step(&mut self) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if !self.paused {
            self.step_internal(&mut result);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Internal: single step
    // -----------------------------------------------------------------------

    fn step_internal(&mut self, result: &mut AdvanceResult) {
        let step = self.sim_state.steps_completed + 1;

        // Phase 1: Flows -- aggregate arithmetic and conveyor.
        let flows = self.phase_flows();

        // Phase 2: Modules -- reconcile tracked entities.
        self.phase_modules(&flows, step);

        // Phase 3: Events -- emit aggregate events and deliver.
        self.phase_events(&flows, step);

        // Phase 4: Bookkeeping.
        self.sim_state.steps_completed = step;
        let report = StepReport {
            step,
            flows,
            stocks: self.stocks,
        };
        log::debug!(
            "day {} -> susceptible {}, bitten {}, zombies {}, last bites on susceptible {}",
            step,
            self.stocks.susceptible,
            self.stocks.bitten,
            self.stocks.zombie,
            self.last_bites_on_susceptible
        );
        self.last_report = Some(report);
        result.steps_run += 1;
        result.reports.push(report);
    }

    // -----------------------------------------------------------------------
    // Phase 1: Flows
    // -----------------------------------------------------------------------

    fn phase_flows(&mut self) -> StepFlows {
        let p = &self.params;
        let susceptible = self.stocks.susceptible;
        let zombie = self.stocks.zombie;

        // Infection pressure.
        let bitten = self.conveyor.content();
        let non_zombie_population = bitten.saturating_add(susceptible);
        let density = if p.land_area > Fixed64::ZERO {
            saturating_div_64(non_zombie_population, p.land_area)
        } else {
            Fixed64::ZERO
        };
        let relative_density = if p.normal_population_density > Fixed64::ZERO {
            saturating_div_64(density, p.normal_population_density)
        } else {
            Fixed64::ZERO
        };
        let density_effect = self.curve.lookup(relative_density);
        let bites_per_zombie = p.normal_number_of_bites.saturating_mul(density_effect);
        let total_bites = zombie.saturating_mul(bites_per_zombie).saturating_round();

        // Bites landing on susceptible people.
        let denom = non_zombie_population.max(Fixed64::ONE);
        let raw = saturating_div_64(susceptible, denom).saturating_mul(total_bites);
        let getting_bitten = raw.saturating_round().min(susceptible.floor());
        self.last_bites_on_susceptible = getting_bitten;

        // Conveyor: age, drain, then admit.
        self.conveyor.advance_one_day();
        let raw_outflow = self.conveyor.drain_expired();
        let accepted = self.conveyor.try_inflow(
            getting_bitten,
            p.days_to_become_infected_from_bite,
            p.bitten_capacity,
        );
        let becoming_infected = raw_outflow.saturating_mul(p.conversion_from_people_to_zombies);

        let removed = match p.overflow_policy {
            OverflowPolicy::Discard => getting_bitten,
            OverflowPolicy::RemainSusceptible => accepted,
        };
        self.stocks = CompartmentStocks {
            susceptible: susceptible.saturating_sub(removed).max(Fixed64::ZERO),
            bitten: self.conveyor.content(),
            zombie: zombie.saturating_add(becoming_infected).max(Fixed64::ZERO),
        };

        StepFlows {
            non_zombie_population,
            density_effect,
            total_bites,
            getting_bitten,
            accepted,
            dropped: getting_bitten.saturating_sub(accepted),
            raw_outflow,
            becoming_infected,
        }
    }

    // -----------------------------------------------------------------------
    // Phase 2: Modules
    // -----------------------------------------------------------------------

    fn phase_modules(&mut self, flows: &StepFlows, step: Steps) {
        for module in &mut self.modules {
            let mut ctx = ModuleContext {
                flows,
                rng: &mut self.rng,
                event_bus: &mut self.event_bus,
                step,
            };
            module.on_flows_computed(&mut ctx);
        }
        self.sync_stocks_from_population();
    }

    /// In tracked mode the pools are the system of record for the stocks.
    fn sync_stocks_from_population(&mut self) {
        if let Some(counts) = self.population() {
            self.stocks = CompartmentStocks {
                susceptible: Fixed64::saturating_from_num(counts.healthy),
                bitten: Fixed64::saturating_from_num(counts.bitten),
                zombie: Fixed64::saturating_from_num(counts.zombie),
            };
        }
    }

    // -----------------------------------------------------------------------
    // Phase 3: Events
    // -----------------------------------------------------------------------

    fn phase_events(&mut self, flows: &StepFlows, step: Steps) {
        if flows.accepted < flows.getting_bitten {
            self.event_bus.emit(Event::BitesDropped {
                requested: flows.getting_bitten,
                accepted: flows.accepted,
                step,
            });
        }
        if flows.raw_outflow > Fixed64::ZERO {
            self.event_bus.emit(Event::CohortMatured {
                released: flows.raw_outflow,
                becoming_infected: flows.becoming_infected,
                step,
            });
        }
        self.event_bus.emit(Event::StepCompleted {
            step,
            stocks: self.stocks,
        });
        self.event_bus.deliver();
    }

    // -----------------------------------------------------------------------
    // Removal notifications
    // -----------------------------------------------------------------------

    /// An external collaborator destroyed a tracked entity.
    ///
    /// The entity leaves its pool, the matching kill counter is bumped and
    /// the stocks are re-derived from the pools. Returns the state the entity
    /// was in, or `None` (changing nothing) if the id is unknown. The
    /// conveyor is never touched.
    pub fn notify_entity_removed(&mut self, entity: EntityId) -> Option<HealthState> {
        let state = self
            .modules
            .iter_mut()
            .find_map(|m| m.on_entity_removed(entity))?;
        self.sync_stocks_from_population();
        log::debug!("entity removed while {state:?}");
        self.event_bus.emit(Event::EntityRemoved {
            entity,
            state,
            step: self.sim_state.steps_completed,
        });
        self.event_bus.deliver();
        Some(state)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn stocks(&self) -> CompartmentStocks {
        self.stocks
    }

    pub fn susceptible(&self) -> Fixed64 {
        self.stocks.susceptible
    }

    pub fn bitten(&self) -> Fixed64 {
        self.stocks.bitten
    }

    pub fn zombie(&self) -> Fixed64 {
        self.stocks.zombie
    }

    /// Bites that landed on susceptible people in the most recent step,
    /// before the capacity limit.
    pub fn last_bites_on_susceptible(&self) -> Fixed64 {
        self.last_bites_on_susceptible
    }

    pub fn steps_completed(&self) -> Steps {
        self.sim_state.steps_completed
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn curve(&self) -> &DensityResponseCurve {
        &self.curve
    }

    pub fn conveyor(&self) -> &IncubationConveyor {
        &self.conveyor
    }

    pub fn strategy(&self) -> SimulationStrategy {
        self.strategy
    }

    pub fn tracking(&self) -> Option<&TrackingConfig> {
        self.tracking.as_ref()
    }

    /// Pool sizes reported by the first module that tracks entities.
    pub fn population(&self) -> Option<PopulationCounts> {
        self.modules.iter().find_map(|m| m.population())
    }

    /// Cumulative removals. All zero when nothing is tracked.
    pub fn kill_counters(&self) -> KillCounters {
        self.reconciler()
            .map(|r| r.kills())
            .unwrap_or_default()
    }

    /// Snapshot of the figures a host typically displays.
    pub fn status(&self) -> StatusReport {
        let kills = self.kill_counters();
        StatusReport {
            day: self.sim_state.steps_completed,
            humans: truncate_to_count(self.stocks.susceptible),
            bitten: truncate_to_count(self.stocks.bitten),
            zombies: truncate_to_count(self.stocks.zombie),
            innocent_kills: kills.innocent_kills,
            infected_kills: kills.infected_kills,
            zombie_kills: kills.zombie_kills,
        }
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Per-subsystem hashes, used to pinpoint divergence between engines.
    pub fn subsystem_hashes(&self) -> SubsystemHashes {
        let mut stocks = StateHash::new();
        stocks.write_fixed64(self.stocks.susceptible);
        stocks.write_fixed64(self.stocks.bitten);
        stocks.write_fixed64(self.stocks.zombie);
        stocks.write_fixed64(self.last_bites_on_susceptible);

        let mut conveyor = StateHash::new();
        conveyor.write_u64(self.conveyor.len() as u64);
        for batch in self.conveyor.batches() {
            conveyor.write_fixed64(batch.amount_of_people);
            conveyor.write_fixed64(batch.remaining_days);
        }

        let mut modules = StateHash::new();
        for module in &self.modules {
            modules.write(module.name().as_bytes());
            module.write_state(&mut modules);
        }

        let mut rng = StateHash::new();
        rng.write_u64(self.rng.state());

        let mut sim_state = StateHash::new();
        sim_state.write_u64(self.sim_state.steps_completed);
        sim_state.write_fixed64(self.sim_state.accumulator);

        SubsystemHashes {
            stocks: stocks.finish(),
            conveyor: conveyor.finish(),
            modules: modules.finish(),
            rng: rng.finish(),
            sim_state: sim_state.finish(),
        }
    }

    /// Deterministic hash of the whole simulation state.
    pub fn state_hash(&self) -> u64 {
        let h = self.subsystem_hashes();
        let mut hasher = StateHash::new();
        hasher.write_u64(h.stocks);
        hasher.write_u64(h.conveyor);
        hasher.write_u64(h.modules);
        hasher.write_u64(h.rng);
        hasher.write_u64(h.sim_state);
        hasher.finish()
    }
}

// ---------------------------------------------------------------------------
// Subsystem hashes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemHashes {
    pub stocks: u64,
    pub conveyor: u64,
    pub modules: u64,
    pub rng: u64,
    pub sim_state: u64,
}

// ---------------------------------------------------------------------------
// Status report
// ---------------------------------------------------------------------------

/// Whole-number snapshot of the outbreak. Counts are truncated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub day: Steps,
    pub humans: u64,
    pub bitten: u64,
    pub zombies: u64,
    pub innocent_kills: u64,
    pub infected_kills: u64,
    pub zombie_kills: u64,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day {}: humans {}, bitten {}, zombies {} | killed {} innocents, {} infected, {} zombies",
            self.day,
            self.humans,
            self.bitten,
            self.zombies,
            self.innocent_kills,
            self.infected_kills,
            self.zombie_kills
        )
    }
}

// ===========================================================================
// Tests
// ===========================================================================
