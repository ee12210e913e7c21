use anyhow::Result;
use clap::Parser;

use outbreak_headless::{Cli, init_logging, run};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let summary = run(&cli)?;
    println!("{}", summary.status);
    println!("state hash {:016x}", summary.state_hash);
    Ok(())
}
