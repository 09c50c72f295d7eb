use bookings_core::ReplicaConfig;
use chrono::NaiveDate;

use crate::commands::common::{format_stats_lines, open_seeded_replica};
use crate::error::CliError;

pub async fn run_stats(
    config: &ReplicaConfig,
    today: Option<NaiveDate>,
    as_json: bool,
) -> Result<(), CliError> {
    let replica = open_seeded_replica(config, today).await?;
    let stats = replica.stats().await;
    replica.shutdown();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_stats_lines(&stats) {
            println!("{line}");
        }
    }

    Ok(())
}
