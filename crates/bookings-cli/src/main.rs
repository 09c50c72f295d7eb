//! Bookings CLI - drive in-process booking replicas from the terminal
//!
//! Lists and summarizes the seeded dashboard data and simulates several
//! replicas sharing one channel to check that they converge.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, ListFilter};
use crate::commands::list::run_list;
use crate::commands::simulate::{run_simulate, SimulationOptions};
use crate::commands::stats::run_stats;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: tracing_subscriber::filter::Directive = "bookings=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List {
            status,
            date,
            upcoming,
            search,
            json,
        } => {
            let filter = ListFilter {
                status,
                date,
                upcoming,
                search,
            };
            run_list(&config, &filter, json).await?;
        }
        Commands::Stats { today, json } => run_stats(&config, today, json).await?,
        Commands::Simulate {
            contexts,
            creates,
            strategy,
            json,
        } => {
            let options = SimulationOptions {
                contexts,
                creates,
                strategy: strategy.unwrap_or(config.id_strategy),
            };
            run_simulate(&config, options, json).await?;
        }
    }

    Ok(())
}
