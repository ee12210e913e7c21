//! Module system for layering behavior on top of the aggregate step.
//!
//! The engine computes aggregate flows once per step and then hands them to
//! every registered [`Module`] through a [`ModuleContext`]. The agent
//! reconciler is one such module; hosts can register their own (for
//! example to record time series) without touching the step arithmetic.
//!
//! A module that owns individually tracked entities reports their counts via
//! [`Module::population`]; the engine then treats those counts as the
//! system of record for the reported stocks.

use crate::event::EventBus;
use crate::fixed::Steps;
use crate::id::EntityId;
use crate::reconciler::HealthState;
use crate::rng::SimRng;
use crate::sim::{StateHash, StepFlows};

// ---------------------------------------------------------------------------
// Module trait
// ---------------------------------------------------------------------------

/// A simulation module that hooks into the engine's step.
///
/// Every method except `name` and the `Any` accessors has a no-op default,
/// so modules only override what they care about.
pub trait Module: std::fmt::Debug {
    /// The human-readable name of this module, used for lookup and debugging.
    fn name(&self) -> &str;

    /// Called once per step, after the aggregate flows are final.
    fn on_flows_computed(&mut self, ctx: &mut ModuleContext<'_>) {
        let _ = ctx;
    }

    /// Entity counts per pool, if this module tracks entities.
    fn population(&self) -> Option<PopulationCounts> {
        None
    }

    /// An entity was destroyed by an external collaborator. Returns the pool
    /// the entity belonged to if this module owned it.
    fn on_entity_removed(&mut self, entity: EntityId) -> Option<HealthState> {
        let _ = entity;
        None
    }

    /// Feed module state into the engine's state hash.
    fn write_state(&self, hash: &mut StateHash) {
        let _ = hash;
    }

    /// Downcast to `&dyn Any` for type-safe access to concrete module types.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Downcast to `&mut dyn Any` for type-safe mutable access to concrete module types.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

// ---------------------------------------------------------------------------
// ModuleContext
// ---------------------------------------------------------------------------

/// Context passed to modules during `on_flows_computed`.
pub struct ModuleContext<'a> {
    /// The flows of the step being completed.
    pub flows: &'a StepFlows,
    /// The engine's single random source. Draw order is part of the
    /// reproducibility contract.
    pub rng: &'a mut SimRng,
    /// The event bus for emitting events.
    pub event_bus: &'a mut EventBus,
    /// The step being completed (1-based).
    pub step: Steps,
}

// ---------------------------------------------------------------------------
// PopulationCounts
// ---------------------------------------------------------------------------

/// Sizes of the three entity pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PopulationCounts {
    pub healthy: u64,
    pub bitten: u64,
    pub zombie: u64,
}

impl PopulationCounts {
    pub fn total(&self) -> u64 {
        self.healthy + self.bitten + self.zombie
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed64;

    #[derive(Debug, Default)]
    struct FlowRecorder {
        accepted: Vec<Fixed64>,
    }

    impl Module for FlowRecorder {
        fn name(&self) -> &str {
            "flow_recorder"
        }

        fn on_flows_computed(&mut self, ctx: &mut ModuleContext<'_>) {
            self.accepted.push(ctx.flows.accepted);
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn call(module: &mut dyn Module, flows: &StepFlows) {
        let mut rng = SimRng::new(1);
        let mut bus = EventBus::default();
        let mut ctx = ModuleContext {
            flows,
            rng: &mut rng,
            event_bus: &mut bus,
            step: 1,
        };
        module.on_flows_computed(&mut ctx);
    }

    #[test]
    fn defaults_are_no_ops() {
        let mut module = FlowRecorder::default();
        assert!(module.population().is_none());

        use slotmap::SlotMap;
        let mut sm = SlotMap::<EntityId, ()>::with_key();
        let id = sm.insert(());
        assert!(module.on_entity_removed(id).is_none());

        let before = StateHash::new();
        let mut after = StateHash::new();
        module.write_state(&mut after);
        assert_eq!(before, after);
    }

    #[test]
    fn module_sees_flows() {
        let mut module = FlowRecorder::default();
        let flows = StepFlows {
            accepted: Fixed64::from_num(3),
            ..Default::default()
        };
        call(&mut module, &flows);
        call(&mut module, &flows);
        assert_eq!(module.accepted, vec![Fixed64::from_num(3); 2]);
    }

    #[test]
    fn downcast_to_concrete_module() {
        let module: Box<dyn Module> = Box::new(FlowRecorder::default());
        assert_eq!(module.name(), "flow_recorder");
        assert!(module.as_any().downcast_ref::<FlowRecorder>().is_some());
    }

    #[test]
    fn population_total() {
        let counts = PopulationCounts {
            healthy: 5,
            bitten: 2,
            zombie: 1,
        };
        assert_eq!(counts.total(), 8);
    }
}
