//! Simulation configuration and validation.
//!
//! [`SimulationConfig`] is the plain, serde-friendly description of a run:
//! every quantity is an `f64` and every field has a default, so partial
//! scenario files deserialize cleanly. [`SimulationConfig::validate`] checks
//! it and converts it once into the fixed-point [`ValidatedConfig`] the
//! engine runs on. Nothing reaches the engine without passing validation.

use serde::{Deserialize, Serialize};

use crate::curve::{CalibrationPoint, CurveError, DensityResponseCurve};
use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::sim::CompartmentStocks;

// ---------------------------------------------------------------------------
// Raw configuration
// ---------------------------------------------------------------------------

/// One row of the density-effect table, as loaded from a data file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRow {
    /// Relative population density.
    pub x: f64,
    /// Bite-rate multiplier at that density.
    pub y: f64,
}

/// What happens to bites the incubation conveyor has no room for.
///
/// Tracked runs must use [`OverflowPolicy::RemainSusceptible`]: the pools are
/// the system of record and a refused bite leaves its entity healthy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Rejected bite victims leave the susceptible stock without entering
    /// incubation: they are lost.
    #[default]
    Discard,
    /// Rejected bite victims stay susceptible.
    RemainSusceptible,
}

/// Layout of individually tracked entities.
///
/// `grid_width * grid_height` healthy entities are spawned in row-major
/// order, plus one zombie entity per initial zombie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub grid_width: u32,
    pub grid_height: u32,
}

impl TrackingConfig {
    pub fn population(&self) -> u64 {
        self.grid_width as u64 * self.grid_height as u64
    }
}

/// Complete description of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Land area where people live (m^2).
    pub land_area: f64,
    /// Reference population density (people/m^2).
    pub normal_population_density: f64,
    /// Bites per zombie per day at the reference density.
    pub normal_number_of_bites: f64,
    /// Incubation time from bite to zombie, in days.
    pub days_to_become_infected_from_bite: f64,
    /// Maximum number of people incubating at once.
    pub bitten_capacity: f64,
    /// Fraction of a matured cohort that becomes zombie.
    pub conversion_from_people_to_zombies: f64,
    /// Host seconds per simulated day.
    pub step_interval_seconds: f64,
    /// Initial susceptible stock.
    pub susceptible: f64,
    /// Initial zombie stock.
    pub zombie: f64,
    /// Density-effect calibration table, sorted by strictly increasing x.
    pub calibration: Vec<CalibrationRow>,
    /// Seed for entity selection.
    pub seed: u64,
    pub overflow_policy: OverflowPolicy,
    /// Individually tracked entities. `None` runs aggregates only.
    pub tracking: Option<TrackingConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            land_area: 1000.0,
            normal_population_density: 0.1,
            normal_number_of_bites: 1.0,
            days_to_become_infected_from_bite: 15.0,
            bitten_capacity: 100.0,
            conversion_from_people_to_zombies: 1.0,
            step_interval_seconds: 1.0,
            susceptible: 100.0,
            zombie: 1.0,
            calibration: Vec::new(),
            seed: 0,
            overflow_policy: OverflowPolicy::Discard,
            tracking: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Fixed-point model parameters used by every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelParams {
    pub land_area: Fixed64,
    pub normal_population_density: Fixed64,
    pub normal_number_of_bites: Fixed64,
    pub days_to_become_infected_from_bite: Fixed64,
    pub bitten_capacity: Fixed64,
    pub conversion_from_people_to_zombies: Fixed64,
    pub overflow_policy: OverflowPolicy,
}

/// A configuration that passed validation, converted to engine types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub params: ModelParams,
    pub initial: CompartmentStocks,
    pub curve: DensityResponseCurve,
    pub step_interval: Fixed64,
    pub seed: u64,
    pub tracking: Option<TrackingConfig>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a [`SimulationConfig`] is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be finite")]
    NotFinite { field: &'static str },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    /// The value does not fit the engine's fixed-point range.
    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("step_interval_seconds must be positive")]
    NonPositiveStepInterval,

    #[error("invalid calibration table: {0}")]
    Calibration(#[from] CurveError),

    /// Tracked mode needs exactly one healthy entity per susceptible person.
    #[error("tracking grid holds {grid} people but susceptible is {susceptible}")]
    PopulationMismatch { grid: u64, susceptible: f64 },

    #[error("zombie must be a whole number when tracking entities")]
    FractionalZombies,

    /// Tracked entities are never destroyed by the step, so bites refused
    /// by the capacity limit cannot be lost.
    #[error("tracking requires overflow_policy = remain_susceptible")]
    TrackedDiscard,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn quantity(field: &'static str, value: f64) -> Result<Fixed64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { field });
    }
    f64_to_fixed64(value).ok_or(ConfigError::OutOfRange { field, value })
}

impl SimulationConfig {
    /// Check every field and convert to engine types.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let params = ModelParams {
            land_area: quantity("land_area", self.land_area)?,
            normal_population_density: quantity(
                "normal_population_density",
                self.normal_population_density,
            )?,
            normal_number_of_bites: quantity("normal_number_of_bites", self.normal_number_of_bites)?,
            days_to_become_infected_from_bite: quantity(
                "days_to_become_infected_from_bite",
                self.days_to_become_infected_from_bite,
            )?,
            bitten_capacity: quantity("bitten_capacity", self.bitten_capacity)?,
            conversion_from_people_to_zombies: quantity(
                "conversion_from_people_to_zombies",
                self.conversion_from_people_to_zombies,
            )?,
            overflow_policy: self.overflow_policy,
        };

        if !self.step_interval_seconds.is_finite() {
            return Err(ConfigError::NotFinite {
                field: "step_interval_seconds",
            });
        }
        if self.step_interval_seconds <= 0.0 {
            return Err(ConfigError::NonPositiveStepInterval);
        }
        let step_interval = quantity("step_interval_seconds", self.step_interval_seconds)?;
        if step_interval == Fixed64::ZERO {
            return Err(ConfigError::NonPositiveStepInterval);
        }

        let initial = CompartmentStocks {
            susceptible: quantity("susceptible", self.susceptible)?,
            bitten: Fixed64::ZERO,
            zombie: quantity("zombie", self.zombie)?,
        };

        let points = self
            .calibration
            .iter()
            .map(|row| {
                Ok(CalibrationPoint::new(
                    quantity("calibration.x", row.x)?,
                    quantity("calibration.y", row.y)?,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let curve = DensityResponseCurve::new(points)?;

        if let Some(tracking) = &self.tracking {
            let grid = tracking.population();
            if grid as f64 != self.susceptible {
                return Err(ConfigError::PopulationMismatch {
                    grid,
                    susceptible: self.susceptible,
                });
            }
            if self.zombie.fract() != 0.0 {
                return Err(ConfigError::FractionalZombies);
            }
            if self.overflow_policy == OverflowPolicy::Discard {
                return Err(ConfigError::TrackedDiscard);
            }
        }

        if self.conversion_from_people_to_zombies > 1.0 {
            log::warn!(
                "conversion_from_people_to_zombies = {} amplifies matured cohorts",
                self.conversion_from_people_to_zombies
            );
        }

        Ok(ValidatedConfig {
            params,
            initial,
            curve,
            step_interval,
            seed: self.seed,
            tracking: self.tracking,
        })
    }
}
