//! On-disk shapes of scenario files.
//!
//! `scenario.{ron,toml,json}` deserializes straight into
//! [`SimulationConfig`]; every field is optional. The density-effect table
//! has its own row type so files can use descriptive column names.

use outbreak_core::config::CalibrationRow;
use serde::{Deserialize, Serialize};

/// One row of `density_effect.{ron,toml,json}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DensityEffectRow {
    /// Population density relative to the normal density.
    pub population_density: f64,
    /// Multiplier applied to the normal number of bites.
    pub effect: f64,
}

impl From<DensityEffectRow> for CalibrationRow {
    fn from(row: DensityEffectRow) -> Self {
        CalibrationRow {
            x: row.population_density,
            y: row.effect,
        }
    }
}

/// TOML key holding the density-effect rows.
pub const DENSITY_EFFECT_TOML_KEY: &str = "rows";
