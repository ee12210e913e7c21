//! Scenario loading for the outbreak simulation.
//!
//! A scenario directory holds:
//!
//! - `scenario.{ron,toml,json}` (required): a
//!   [`SimulationConfig`](outbreak_core::config::SimulationConfig) with any
//!   subset of fields.
//! - `density_effect.{ron,toml,json}` (optional): the density-effect table.
//!   When present it replaces any inline `calibration` of the scenario file.
//!
//! [`load_scenario`] finds, parses and validates both.

pub mod loader;
pub mod schema;

use std::path::{Path, PathBuf};

use outbreak_core::config::SimulationConfig;

pub use loader::DataLoadError;
use loader::{deserialize_file, deserialize_list, find_data_file, require_data_file};
use schema::{DENSITY_EFFECT_TOML_KEY, DensityEffectRow};

pub const SCENARIO_FILE: &str = "scenario";
pub const DENSITY_EFFECT_FILE: &str = "density_effect";

/// A loaded, validated scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub config: SimulationConfig,
    pub scenario_file: PathBuf,
    pub density_effect_file: Option<PathBuf>,
}

/// Load the scenario in `dir`.
pub fn load_scenario(dir: &Path) -> Result<Scenario, DataLoadError> {
    let scenario_file = require_data_file(dir, SCENARIO_FILE)?;
    let mut config: SimulationConfig = deserialize_file(&scenario_file)?;

    let density_effect_file = find_data_file(dir, DENSITY_EFFECT_FILE)?;
    if let Some(path) = &density_effect_file {
        if !config.calibration.is_empty() {
            log::warn!(
                "{} overrides the calibration in {}",
                path.display(),
                scenario_file.display()
            );
        }
        let rows: Vec<DensityEffectRow> = deserialize_list(path, DENSITY_EFFECT_TOML_KEY)?;
        config.calibration = rows.into_iter().map(Into::into).collect();
    }

    config.validate()?;
    log::info!(
        "loaded scenario from {} ({} calibration points)",
        dir.display(),
        config.calibration.len()
    );

    Ok(Scenario {
        config,
        scenario_file,
        density_effect_file,
    })
}
