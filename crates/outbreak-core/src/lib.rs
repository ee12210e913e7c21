//! Outbreak Core -- a stock-flow simulation of a zombie outbreak.
//!
//! A population is split into three compartments: Susceptible, Bitten
//! (incubating) and Zombie. Zombies bite at a rate scaled by a data-driven
//! density response curve; bitten people wait out their incubation on a
//! capacity-limited conveyor before turning. Optionally, aggregate flows are
//! reconciled onto a finite population of individually tracked entities.
//!
//! # Step pipeline
//!
//! Each call to [`engine::Engine::step`] advances the simulation by one day:
//!
//! 1. **Flows** -- Compute density, bite pressure and new bites; age, drain
//!    and refill the [`conveyor::IncubationConveyor`]; update the stocks.
//! 2. **Modules** -- Registered [`module::Module`]s see the flows. The
//!    [`reconciler::AgentReconciler`] moves tracked entities between pools.
//! 3. **Events** -- Emit aggregate events and deliver everything buffered.
//! 4. **Bookkeeping** -- Increment the step counter and log the day.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns stocks, conveyor, curve and modules.
//! - [`config::SimulationConfig`] -- Plain serde configuration, validated into
//!   [`config::ValidatedConfig`] before use.
//! - [`curve::DensityResponseCurve`] -- Clamped piecewise-linear lookup.
//! - [`conveyor::IncubationConveyor`] -- Delay line of incubating cohorts.
//! - [`reconciler::AgentReconciler`] -- Entity pools and kill counters.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`event::EventBus`] -- Buffered, per-kind event delivery.

pub mod config;
pub mod conveyor;
pub mod curve;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod id;
pub mod module;
pub mod reconciler;
pub mod rng;
pub mod sim;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
