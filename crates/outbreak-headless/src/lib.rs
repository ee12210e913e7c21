//! Headless outbreak runner.
//!
//! Loads a scenario directory, plays the host clock for a fixed number of
//! days and reports the final status. The binary in `main.rs` only parses
//! arguments, installs the logger and prints what [`run`] returns.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::LevelFilter;
use log4rs::Config;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

use outbreak_core::engine::{Engine, StatusReport};
use outbreak_core::fixed::Steps;
use outbreak_core::sim::SimulationStrategy;
use outbreak_core::validation::validate_determinism;

const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

#[derive(Parser, Debug)]
#[command(name = "outbreak-headless")]
#[command(about = "Run a zombie outbreak scenario without a host event loop")]
pub struct Cli {
    /// Directory holding scenario.{ron,toml,json} and optionally density_effect.{ron,toml,json}
    pub scenario_dir: PathBuf,

    /// Number of days to simulate
    #[arg(long, default_value_t = 100)]
    pub days: Steps,

    /// Override the scenario's seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log every step at debug level
    #[arg(long)]
    pub verbose: bool,

    /// Run the scenario twice and fail if the runs diverge
    #[arg(long)]
    pub check_determinism: bool,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub status: StatusReport,
    pub state_hash: u64,
    /// Days compared by the determinism check, if it ran.
    pub determinism_days: Option<usize>,
}

/// Install the console logger. Info level, or debug with `verbose`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .context("failed to build log config")?;
    log4rs::init_config(config).context("failed to install logger")?;
    Ok(())
}

/// Load the scenario and run it for `cli.days` days.
pub fn run(cli: &Cli) -> Result<RunSummary> {
    let mut scenario = outbreak_data::load_scenario(&cli.scenario_dir)
        .with_context(|| format!("failed to load {}", cli.scenario_dir.display()))?;
    if let Some(seed) = cli.seed {
        scenario.config.seed = seed;
    }

    let mut determinism_days = None;
    if cli.check_determinism {
        let result = validate_determinism(&scenario.config, cli.days)?;
        if let Some(step) = result.divergence_step {
            bail!("runs diverged at day {step}");
        }
        log::info!("{} days reproduced identically", result.hash_log.len());
        determinism_days = Some(result.hash_log.len());
    }

    let mut engine = Engine::new(&scenario.config)?.with_strategy(SimulationStrategy::Tick);
    for _ in 0..cli.days {
        engine.step();
        log::info!("{}", engine.status());
    }

    Ok(RunSummary {
        status: engine.status(),
        state_hash: engine.state_hash(),
        determinism_days,
    })
}
