//! Agent reconciler: maps aggregate flows onto individually tracked entities.
//!
//! Every tracked entity is in exactly one of three pools (Healthy, Bitten,
//! Zombie) matching its [`HealthState`]. Each step the reconciler rounds the
//! step's `accepted` and `becoming_infected` flows to whole counts and moves
//! that many randomly drawn entities forward:
//!
//! 1. Healthy -> Bitten, `round(accepted)` draws.
//! 2. Bitten -> Zombie, `round(becoming_infected)` draws.
//!
//! Draws are uniform without replacement from the current pool, using the
//! engine's [`SimRng`], so a seed determines the whole trajectory. A pool
//! running dry ends its draws early; the missing transitions are dropped and
//! reported as a [`Event::ReconcileShortfall`].
//!
//! Entities only leave the population through an external removal
//! notification, which the reconciler classifies into [`KillCounters`].

use slotmap::{Key, SlotMap};

use crate::config::TrackingConfig;
use crate::event::Event;
use crate::fixed::round_to_count;
use crate::id::{EntityId, GridCell};
use crate::module::{Module, ModuleContext, PopulationCounts};
use crate::rng::SimRng;
use crate::sim::StateHash;

// ---------------------------------------------------------------------------
// Health state
// ---------------------------------------------------------------------------

/// Health state of a tracked entity. Only ever advances in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthState {
    Healthy,
    Bitten,
    Zombie,
}

impl HealthState {
    pub const ALL: [HealthState; 3] = [HealthState::Healthy, HealthState::Bitten, HealthState::Zombie];

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Entity pools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Entity {
    state: HealthState,
    cell: Option<GridCell>,
    /// Position of this entity inside its pool's member list.
    slot: usize,
}

/// Three disjoint pools of entities keyed by generational ids.
///
/// Membership lists support O(1) removal by swap-remove; each entity records
/// its own slot so the entity moved into the hole can be fixed up.
#[derive(Debug, Clone, Default)]
pub struct EntityPools {
    entities: SlotMap<EntityId, Entity>,
    members: [Vec<EntityId>; 3],
}

impl EntityPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `grid_width * grid_height` healthy entities in row-major order,
    /// followed by `zombies` zombie entities without a cell.
    pub fn populate(tracking: &TrackingConfig, zombies: u64) -> Self {
        let mut pools = Self::new();
        for y in 0..tracking.grid_height {
            for x in 0..tracking.grid_width {
                pools.spawn(HealthState::Healthy, Some(GridCell::new(x, y)));
            }
        }
        for _ in 0..zombies {
            pools.spawn(HealthState::Zombie, None);
        }
        pools
    }

    pub fn spawn(&mut self, state: HealthState, cell: Option<GridCell>) -> EntityId {
        let slot = self.members[state.index()].len();
        let id = self.entities.insert(Entity { state, cell, slot });
        self.members[state.index()].push(id);
        id
    }

    pub fn state_of(&self, id: EntityId) -> Option<HealthState> {
        self.entities.get(id).map(|e| e.state)
    }

    pub fn cell_of(&self, id: EntityId) -> Option<GridCell> {
        self.entities.get(id).and_then(|e| e.cell)
    }

    /// Members of one pool. Order is an implementation detail.
    pub fn members(&self, state: HealthState) -> &[EntityId] {
        &self.members[state.index()]
    }

    pub fn len(&self, state: HealthState) -> usize {
        self.members[state.index()].len()
    }

    pub fn total(&self) -> usize {
        self.entities.len()
    }

    pub fn counts(&self) -> PopulationCounts {
        PopulationCounts {
            healthy: self.len(HealthState::Healthy) as u64,
            bitten: self.len(HealthState::Bitten) as u64,
            zombie: self.len(HealthState::Zombie) as u64,
        }
    }

    /// Detach `id` from its member list, keeping the moved entity's slot valid.
    fn unlink(&mut self, state: HealthState, slot: usize) -> Option<EntityId> {
        let list = &mut self.members[state.index()];
        if slot >= list.len() {
            return None;
        }
        let id = list.swap_remove(slot);
        if let Some(&moved) = list.get(slot)
            && let Some(entity) = self.entities.get_mut(moved)
        {
            entity.slot = slot;
        }
        Some(id)
    }

    /// Move one uniformly drawn member of `from` into `to`.
    /// Returns `None` when `from` is empty; no random number is consumed then.
    pub fn transition_random(
        &mut self,
        from: HealthState,
        to: HealthState,
        rng: &mut SimRng,
    ) -> Option<EntityId> {
        let len = self.len(from);
        if len == 0 {
            return None;
        }
        let id = self.unlink(from, rng.below(len))?;
        let slot = self.members[to.index()].len();
        self.members[to.index()].push(id);
        if let Some(entity) = self.entities.get_mut(id) {
            entity.state = to;
            entity.slot = slot;
        }
        Some(id)
    }

    /// Destroy an entity. Returns the state it was in, or `None` if the id is
    /// unknown or already removed.
    pub fn remove(&mut self, id: EntityId) -> Option<HealthState> {
        let entity = self.entities.remove(id)?;
        self.unlink(entity.state, entity.slot);
        Some(entity.state)
    }

    fn write_state(&self, hash: &mut StateHash) {
        for list in &self.members {
            hash.write_u64(list.len() as u64);
            for id in list {
                hash.write_u64(id.data().as_ffi());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Kill counters
// ---------------------------------------------------------------------------

/// Cumulative removals, classified by the state the entity was in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KillCounters {
    /// Healthy entities removed.
    pub innocent_kills: u64,
    /// Bitten entities removed.
    pub infected_kills: u64,
    pub zombie_kills: u64,
}

impl KillCounters {
    pub fn record(&mut self, state: HealthState) {
        match state {
            HealthState::Healthy => self.innocent_kills += 1,
            HealthState::Bitten => self.infected_kills += 1,
            HealthState::Zombie => self.zombie_kills += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler module
// ---------------------------------------------------------------------------

/// The reconciler module. Registered by the engine when tracking is enabled.
#[derive(Debug, Clone)]
pub struct AgentReconciler {
    pools: EntityPools,
    kills: KillCounters,
}

impl AgentReconciler {
    pub fn new(pools: EntityPools) -> Self {
        Self {
            pools,
            kills: KillCounters::default(),
        }
    }

    pub fn from_tracking(tracking: &TrackingConfig, zombies: u64) -> Self {
        Self::new(EntityPools::populate(tracking, zombies))
    }

    pub fn pools(&self) -> &EntityPools {
        &self.pools
    }

    pub fn kills(&self) -> KillCounters {
        self.kills
    }

    pub fn state_of(&self, id: EntityId) -> Option<HealthState> {
        self.pools.state_of(id)
    }

    pub fn cell_of(&self, id: EntityId) -> Option<GridCell> {
        self.pools.cell_of(id)
    }

    /// Iterate one pool's members.
    pub fn iter_pool(&self, state: HealthState) -> impl Iterator<Item = EntityId> + '_ {
        self.pools.members(state).iter().copied()
    }

    /// Run up to `requested` transitions from `from` to `to`. Returns how many
    /// actually happened.
    fn realize(
        &mut self,
        from: HealthState,
        to: HealthState,
        requested: u64,
        ctx: &mut ModuleContext<'_>,
    ) -> u64 {
        let mut realized = 0;
        while realized < requested {
            let Some(entity) = self.pools.transition_random(from, to, ctx.rng) else {
                break;
            };
            realized += 1;
            let event = match to {
                HealthState::Zombie => Event::EntityTurned {
                    entity,
                    step: ctx.step,
                },
                _ => Event::EntityBitten {
                    entity,
                    step: ctx.step,
                },
            };
            ctx.event_bus.emit(event);
        }
        if realized < requested {
            report_shortfall(from, requested, realized, ctx);
        }
        realized
    }
}

fn report_shortfall(pool: HealthState, requested: u64, realized: u64, ctx: &mut ModuleContext<'_>) {
    let step = ctx.step;
    log::trace!("day {step}: {pool:?} pool short, requested {requested}, realized {realized}");
    ctx.event_bus.emit(Event::ReconcileShortfall {
        pool,
        requested,
        realized,
        step,
    });
}

impl Module for AgentReconciler {
    fn name(&self) -> &str {
        "agent_reconciler"
    }

    fn on_flows_computed(&mut self, ctx: &mut ModuleContext<'_>) {
        let new_bitten = round_to_count(ctx.flows.accepted);
        let new_zombies = round_to_count(ctx.flows.becoming_infected);
        self.realize(HealthState::Healthy, HealthState::Bitten, new_bitten, ctx);
        self.realize(HealthState::Bitten, HealthState::Zombie, new_zombies, ctx);
    }

    fn population(&self) -> Option<PopulationCounts> {
        Some(self.pools.counts())
    }

    fn on_entity_removed(&mut self, entity: EntityId) -> Option<HealthState> {
        let state = self.pools.remove(entity)?;
        self.kills.record(state);
        Some(state)
    }

    fn write_state(&self, hash: &mut StateHash) {
        self.pools.write_state(hash);
        hash.write_u64(self.kills.innocent_kills);
        hash.write_u64(self.kills.infected_kills);
        hash.write_u64(self.kills.zombie_kills);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBus, EventKind};
    use crate::fixed::Fixed64;
    use crate::sim::StepFlows;

    fn grid(w: u32, h: u32) -> TrackingConfig {
        TrackingConfig {
            grid_width: w,
            grid_height: h,
        }
    }

    fn flows(accepted: f64, becoming_infected: f64) -> StepFlows {
        StepFlows {
            accepted: Fixed64::from_num(accepted),
            becoming_infected: Fixed64::from_num(becoming_infected),
            ..Default::default()
        }
    }

    fn run(reconciler: &mut AgentReconciler, flows: &StepFlows, rng: &mut SimRng, bus: &mut EventBus) {
        let mut ctx = ModuleContext {
            flows,
            rng,
            event_bus: bus,
            step: 1,
        };
        reconciler.on_flows_computed(&mut ctx);
    }

    fn assert_pools_consistent(pools: &EntityPools) {
        let mut seen = 0;
        for state in HealthState::ALL {
            for (slot, &id) in pools.members(state).iter().enumerate() {
                let entity = &pools.entities[id];
                assert_eq!(entity.state, state);
                assert_eq!(entity.slot, slot);
                seen += 1;
            }
        }
        assert_eq!(seen, pools.total());
    }

    // -----------------------------------------------------------------------
    // Pools
    // -----------------------------------------------------------------------

    #[test]
    fn populate_lays_out_grid_row_major() {
        let pools = EntityPools::populate(&grid(3, 2), 2);
        assert_eq!(
            pools.counts(),
            PopulationCounts {
                healthy: 6,
                bitten: 0,
                zombie: 2
            }
        );
        let cells: Vec<GridCell> = pools
            .members(HealthState::Healthy)
            .iter()
            .filter_map(|&id| pools.cell_of(id))
            .collect();
        assert_eq!(cells[0], GridCell::new(0, 0));
        assert_eq!(cells[1], GridCell::new(1, 0));
        assert_eq!(cells[3], GridCell::new(0, 1));
        for &id in pools.members(HealthState::Zombie) {
            assert!(pools.cell_of(id).is_none());
        }
        assert_pools_consistent(&pools);
    }

    #[test]
    fn transition_moves_between_pools() {
        let mut pools = EntityPools::populate(&grid(4, 1), 0);
        let mut rng = SimRng::new(3);
        let id = pools
            .transition_random(HealthState::Healthy, HealthState::Bitten, &mut rng)
            .unwrap();
        assert_eq!(pools.state_of(id), Some(HealthState::Bitten));
        assert_eq!(pools.len(HealthState::Healthy), 3);
        assert_eq!(pools.members(HealthState::Bitten), &[id]);
        assert_pools_consistent(&pools);
    }

    #[test]
    fn transition_from_empty_pool_draws_nothing() {
        let mut pools = EntityPools::populate(&grid(2, 1), 0);
        let mut rng = SimRng::new(3);
        let before = rng.state();
        assert!(
            pools
                .transition_random(HealthState::Bitten, HealthState::Zombie, &mut rng)
                .is_none()
        );
        assert_eq!(rng.state(), before);
    }

    #[test]
    fn remove_classifies_and_forgets() {
        let mut pools = EntityPools::populate(&grid(5, 1), 1);
        let victim = pools.members(HealthState::Healthy)[1];
        assert_eq!(pools.remove(victim), Some(HealthState::Healthy));
        assert_eq!(pools.remove(victim), None);
        assert_eq!(pools.state_of(victim), None);
        assert_eq!(pools.len(HealthState::Healthy), 4);
        assert_pools_consistent(&pools);
    }

    #[test]
    fn mixed_operations_keep_slots_valid() {
        let mut pools = EntityPools::populate(&grid(10, 10), 3);
        let mut rng = SimRng::new(99);
        for round in 0..40 {
            pools.transition_random(HealthState::Healthy, HealthState::Bitten, &mut rng);
            if round % 3 == 0 {
                pools.transition_random(HealthState::Bitten, HealthState::Zombie, &mut rng);
            }
            if round % 5 == 0
                && let Some(&id) = pools.members(HealthState::Bitten).first()
            {
                pools.remove(id);
            }
            assert_pools_consistent(&pools);
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    #[test]
    fn reconcile_moves_rounded_counts() {
        let mut reconciler = AgentReconciler::from_tracking(&grid(10, 10), 1);
        let mut rng = SimRng::new(7);
        let mut bus = EventBus::default();

        run(&mut reconciler, &flows(2.5, 0.0), &mut rng, &mut bus);
        let counts = reconciler.population().unwrap();
        assert_eq!(counts.healthy, 97);
        assert_eq!(counts.bitten, 3);
        assert_eq!(bus.buffered_count(EventKind::EntityBitten), 3);

        run(&mut reconciler, &flows(0.0, 1.4), &mut rng, &mut bus);
        let counts = reconciler.population().unwrap();
        assert_eq!(counts.bitten, 2);
        assert_eq!(counts.zombie, 2);
        assert_eq!(bus.buffered_count(EventKind::EntityTurned), 1);
        assert_eq!(bus.buffered_count(EventKind::ReconcileShortfall), 0);
    }

    #[test]
    fn freshly_bitten_can_turn_in_same_step() {
        let mut reconciler = AgentReconciler::from_tracking(&grid(2, 1), 0);
        let mut rng = SimRng::new(1);
        let mut bus = EventBus::default();
        run(&mut reconciler, &flows(2.0, 2.0), &mut rng, &mut bus);
        let counts = reconciler.population().unwrap();
        assert_eq!(counts.healthy, 0);
        assert_eq!(counts.bitten, 0);
        assert_eq!(counts.zombie, 2);
    }

    #[test]
    fn shortfall_is_dropped_and_reported() {
        let mut reconciler = AgentReconciler::from_tracking(&grid(2, 2), 0);
        let mut rng = SimRng::new(5);
        let mut bus = EventBus::default();
        run(&mut reconciler, &flows(10.0, 0.0), &mut rng, &mut bus);

        let counts = reconciler.population().unwrap();
        assert_eq!(counts.healthy, 0);
        assert_eq!(counts.bitten, 4);
        let shortfalls: Vec<Event> = bus
            .buffer(EventKind::ReconcileShortfall)
            .unwrap()
            .iter()
            .cloned()
            .collect();
        assert_eq!(
            shortfalls,
            vec![Event::ReconcileShortfall {
                pool: HealthState::Healthy,
                requested: 10,
                realized: 4,
                step: 1,
            }]
        );
    }

    #[test]
    fn same_seed_same_selection() {
        let pick = |seed: u64| {
            let mut reconciler = AgentReconciler::from_tracking(&grid(20, 20), 0);
            let mut rng = SimRng::new(seed);
            let mut bus = EventBus::default();
            run(&mut reconciler, &flows(30.0, 0.0), &mut rng, &mut bus);
            let mut bitten: Vec<EntityId> = reconciler.iter_pool(HealthState::Bitten).collect();
            bitten.sort();
            bitten
        };
        assert_eq!(pick(11), pick(11));
        assert_ne!(pick(11), pick(12));
    }

    #[test]
    fn removal_updates_kill_counters() {
        let mut reconciler = AgentReconciler::from_tracking(&grid(3, 1), 1);
        let mut rng = SimRng::new(2);
        let mut bus = EventBus::default();
        run(&mut reconciler, &flows(1.0, 0.0), &mut rng, &mut bus);

        let healthy = reconciler.iter_pool(HealthState::Healthy).next().unwrap();
        let bitten = reconciler.iter_pool(HealthState::Bitten).next().unwrap();
        let zombie = reconciler.iter_pool(HealthState::Zombie).next().unwrap();

        assert_eq!(reconciler.on_entity_removed(healthy), Some(HealthState::Healthy));
        assert_eq!(reconciler.on_entity_removed(bitten), Some(HealthState::Bitten));
        assert_eq!(reconciler.on_entity_removed(zombie), Some(HealthState::Zombie));
        assert_eq!(reconciler.on_entity_removed(zombie), None);

        assert_eq!(
            reconciler.kills(),
            KillCounters {
                innocent_kills: 1,
                infected_kills: 1,
                zombie_kills: 1
            }
        );
        assert_eq!(reconciler.population().unwrap().total(), 1);
    }

    #[test]
    fn state_hash_reflects_membership() {
        let a = AgentReconciler::from_tracking(&grid(3, 3), 1);
        let mut b = a.clone();
        let mut rng = SimRng::new(4);
        b.pools
            .transition_random(HealthState::Healthy, HealthState::Bitten, &mut rng);

        let mut ha = StateHash::new();
        a.write_state(&mut ha);
        let mut hb = StateHash::new();
        b.write_state(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
    }
}
