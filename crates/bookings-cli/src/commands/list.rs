use bookings_core::ReplicaConfig;

use crate::commands::common::{
    format_booking_lines, open_seeded_replica, select_bookings, ListFilter,
};
use crate::error::CliError;

pub async fn run_list(
    config: &ReplicaConfig,
    filter: &ListFilter,
    as_json: bool,
) -> Result<(), CliError> {
    let replica = open_seeded_replica(config, None).await?;
    let bookings = select_bookings(&replica, filter).await;
    replica.shutdown();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&bookings)?);
    } else if bookings.is_empty() {
        println!("No bookings found");
    } else {
        for line in format_booking_lines(&bookings) {
            println!("{line}");
        }
    }

    Ok(())
}
