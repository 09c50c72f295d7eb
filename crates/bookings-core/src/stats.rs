//! Aggregate booking statistics
//!
//! Pure, stateless, recomputed in full on every call.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{Booking, BookingStatus};

/// Counts shown on the dashboard overview
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    /// Dated exactly today
    pub today: usize,
    /// Dated on or after the most recent Sunday
    pub this_week: usize,
    /// Dated on or after the first of the month
    pub this_month: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub completed: usize,
    pub cancelled: usize,
}

impl Stats {
    #[must_use]
    pub const fn by_status(&self, status: BookingStatus) -> usize {
        match status {
            BookingStatus::Pending => self.pending,
            BookingStatus::Confirmed => self.confirmed,
            BookingStatus::Completed => self.completed,
            BookingStatus::Cancelled => self.cancelled,
        }
    }
}

/// Most recent Sunday on or before `today`
#[must_use]
pub fn week_start(today: NaiveDate) -> NaiveDate {
    let back = u64::from(today.weekday().num_days_from_sunday());
    today.checked_sub_days(Days::new(back)).unwrap_or(today)
}

/// First day of `today`'s month
#[must_use]
pub fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

/// Partition `bookings` into the dashboard counters relative to `today`
pub fn compute_stats<'a>(bookings: impl IntoIterator<Item = &'a Booking>, today: NaiveDate) -> Stats {
    let week = week_start(today);
    let month = month_start(today);
    let mut stats = Stats::default();

    for booking in bookings {
        stats.total += 1;
        if booking.date == today {
            stats.today += 1;
        }
        if booking.date >= week {
            stats.this_week += 1;
        }
        if booking.date >= month {
            stats.this_month += 1;
        }
        match booking.status {
            BookingStatus::Pending => stats.pending += 1,
            BookingStatus::Confirmed => stats.confirmed += 1,
            BookingStatus::Completed => stats.completed += 1,
            BookingStatus::Cancelled => stats.cancelled += 1,
        }
    }

    stats
}
