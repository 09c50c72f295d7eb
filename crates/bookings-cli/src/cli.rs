use std::path::PathBuf;

use bookings_core::{BookingStatus, IdStrategy};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bookings")]
#[command(about = "Inspect and simulate replicated booking stores")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional JSON replica config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List bookings of a seeded replica
    #[command(alias = "ls")]
    List {
        /// Only bookings with this status
        #[arg(long)]
        status: Option<BookingStatus>,
        /// Only bookings on this date
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
        /// Only bookings from today through today + DAYS
        #[arg(long, value_name = "DAYS")]
        upcoming: Option<u32>,
        /// Case-insensitive text search
        #[arg(long, value_name = "QUERY")]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show aggregate counts of a seeded replica
    Stats {
        /// Evaluate date windows against this day instead of the current one
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run several in-process replicas and check that they converge
    Simulate {
        /// Number of replicas on the shared channel
        #[arg(long, default_value = "3")]
        contexts: usize,
        /// Bookings created concurrently by each replica
        #[arg(long, default_value = "5")]
        creates: usize,
        /// Id strategy (defaults to the configured one)
        #[arg(long, value_name = "uuid|sequenced")]
        strategy: Option<IdStrategy>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
