use std::path::Path;
use std::sync::Arc;

use bookings_core::clock::{Clock, ManualClock, SystemClock};
use bookings_core::util::normalize_text_option;
use bookings_core::{Booking, BookingStatus, ReplicaConfig, ReplicaService, Stats};
use chrono::{NaiveDate, Utc};

use crate::error::CliError;

/// Filters of `bookings list`; all present filters must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<BookingStatus>,
    pub date: Option<NaiveDate>,
    pub upcoming: Option<u32>,
    pub search: Option<String>,
}

/// Config file (or defaults) with `BOOKINGS_*` overrides applied
pub fn load_config(path: Option<&Path>) -> Result<ReplicaConfig, CliError> {
    let mut config = match path {
        Some(path) => ReplicaConfig::load(path)?,
        None => ReplicaConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

/// Clock pinned to noon UTC of `today`, or the wall clock
pub fn clock_for(today: Option<NaiveDate>) -> Arc<dyn Clock> {
    match today {
        Some(day) => {
            let noon = day
                .and_hms_opt(12, 0, 0)
                .map_or_else(Utc::now, |noon| noon.and_utc());
            Arc::new(ManualClock::new(noon))
        }
        None => Arc::new(SystemClock),
    }
}

/// Standalone replica bootstrapped the way a first dashboard tab is
pub async fn open_seeded_replica(
    config: &ReplicaConfig,
    today: Option<NaiveDate>,
) -> Result<ReplicaService, CliError> {
    let replica = ReplicaService::start_with_clock(config, None, clock_for(today))?;
    let outcome = replica.bootstrap().await?;
    tracing::debug!(?outcome, "Replica ready");
    Ok(replica)
}

pub async fn select_bookings(replica: &ReplicaService, filter: &ListFilter) -> Vec<Booking> {
    let mut bookings = match normalize_text_option(filter.search.clone()) {
        Some(query) => replica.search(&query).await,
        None => replica.all().await,
    };
    if let Some(status) = filter.status {
        bookings.retain(|booking| booking.status == status);
    }
    if let Some(date) = filter.date {
        bookings.retain(|booking| booking.date == date);
    }
    if let Some(days) = filter.upcoming {
        let window = replica.upcoming(days).await;
        bookings.retain(|booking| window.iter().any(|upcoming| upcoming.id == booking.id));
    }
    bookings
}

pub fn format_booking_lines(bookings: &[Booking]) -> Vec<String> {
    bookings
        .iter()
        .map(|booking| {
            let when = format!("{} {}", booking.date, booking.time);
            format!(
                "{when:<19}  {:<9}  {:<24}  {} <{}>  [{}]",
                booking.status.as_str(),
                truncate(&booking.event_type, 24),
                booking.attendee.name,
                booking.attendee.email,
                booking.id
            )
        })
        .collect()
}

pub fn format_stats_lines(stats: &Stats) -> Vec<String> {
    let mut lines = vec![
        format!("{:<11}{}", "total", stats.total),
        format!("{:<11}{}", "today", stats.today),
        format!("{:<11}{}", "this week", stats.this_week),
        format!("{:<11}{}", "this month", stats.this_month),
    ];
    lines.extend(
        BookingStatus::ALL
            .into_iter()
            .map(|status| format!("{:<11}{}", status.as_str(), stats.by_status(status))),
    );
    lines
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut short: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    short.push_str("...");
    short
}
