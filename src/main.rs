mod agent;
mod analysis;
mod config;
mod engine;
mod grid;
mod model;
mod stats;

use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::Engine;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    io::{self, Write},
    path::PathBuf,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and print it as JSON.
    Check,

    /// Run the simulation and print the results as JSON.
    Run {
        #[arg(long)]
        steps: usize,

        /// Overrides the seed of the configuration file.
        #[arg(long)]
        seed: Option<u64>,

        /// Include the report of every step.
        #[arg(long)]
        per_step: bool,

        /// Include the final state of every agent.
        #[arg(long)]
        agents: bool,
    },
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

    let mut cfg = match &args.config {
        Some(file) => Config::from_file(file).context("failed to construct cfg")?,
        None => Config::default(),
    };

    match args.command {
        Command::Check => {
            cfg.validate().context("failed to validate cfg")?;
            write_json(&serde_json::to_value(&cfg)?)?;
        }
        Command::Run {
            steps,
            seed,
            per_step,
            agents,
        } => {
            if seed.is_some() {
                cfg.init.seed = seed;
            }
            log::info!("{cfg:#?}");

            let mut analyzer = Analyzer::new(&cfg, per_step);
            let mut engine = Engine::generate_initial_condition(cfg)
                .context("failed to generate initial condition")?;

            engine
                .run(steps, &mut analyzer)
                .context("failed to run simulation")?;
            log::info!("finished after {} steps", engine.step());

            let mut results = analyzer.report();
            if agents {
                results["agents"] = serde_json::to_value(engine.state().snapshot())?;
            }
            write_json(&results)?;
        }
    }

    Ok(())
}

fn write_json(value: &serde_json::Value) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("failed to serialize results")?;
    writeln!(stdout).context("failed to write results")?;
    Ok(())
}
