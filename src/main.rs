mod analysis;
mod bivariate;
mod config;
mod conjoint;
mod dataset;
mod engine;
mod manager;
mod model;
mod multinomial;
mod stats;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Directory holding the scenario's config.toml
    #[arg(long)]
    scenario_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate dataset.csv
    Generate,

    /// Write dataset-small.csv with the first keys of dataset.csv
    Subset {
        #[arg(long, default_value_t = 20)]
        n_keys: usize,
    },

    /// Summarize dataset.csv into summary.toml
    Analyze,

    /// Remove generated files
    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(args.scenario_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Generate => mgr.generate_dataset()?,
        Command::Subset { n_keys } => mgr.subset_dataset(n_keys)?,
        Command::Analyze => mgr.analyze_dataset()?,
        Command::Clean => mgr.clean_scenario()?,
    }

    Ok(())
}
