//! Demonstration bookings a fresh context starts from when no peer answers.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::models::{Attendee, Booking, BookingId, BookingInput, BookingStatus, ContextId};

/// Writer id stamped on seed records
pub const SEED_CONTEXT: &str = "seed";

struct SeedRow {
    event_type: &'static str,
    name: &'static str,
    email: &'static str,
    phone: &'static str,
    day: u32,
    time: &'static str,
    duration: &'static str,
    status: BookingStatus,
    location: &'static str,
    notes: &'static str,
}

const SEED_ROWS: [SeedRow; 6] = [
    SeedRow {
        event_type: "30-min Consultation",
        name: "John Doe",
        email: "john@example.com",
        phone: "+1 555 0100",
        day: 1,
        time: "09:00 AM",
        duration: "30 min",
        status: BookingStatus::Confirmed,
        location: "Zoom",
        notes: "",
    },
    SeedRow {
        event_type: "Product Demo",
        name: "Jane Smith",
        email: "jane@example.com",
        phone: "+1 555 0101",
        day: 2,
        time: "11:00 AM",
        duration: "1 hour",
        status: BookingStatus::Pending,
        location: "Google Meet",
        notes: "Interested in the team plan",
    },
    SeedRow {
        event_type: "Strategy Session",
        name: "Carlos Diaz",
        email: "carlos@example.com",
        phone: "",
        day: 3,
        time: "02:00 PM",
        duration: "45 min",
        status: BookingStatus::Confirmed,
        location: "Office",
        notes: "",
    },
    SeedRow {
        event_type: "Follow-up Call",
        name: "Priya Patel",
        email: "priya@example.com",
        phone: "+44 20 7946 0000",
        day: 4,
        time: "04:30 PM",
        duration: "15 min",
        status: BookingStatus::Pending,
        location: "Phone",
        notes: "Reschedule if needed",
    },
    SeedRow {
        event_type: "30-min Consultation",
        name: "Mei Chen",
        email: "mei@example.com",
        phone: "",
        day: 5,
        time: "10:00 AM",
        duration: "30 min",
        status: BookingStatus::Completed,
        location: "Zoom",
        notes: "Sent recap email",
    },
    SeedRow {
        event_type: "Product Demo",
        name: "Tom Becker",
        email: "tom@example.com",
        phone: "+49 30 901820",
        day: 6,
        time: "03:00 PM",
        duration: "1 hour",
        status: BookingStatus::Cancelled,
        location: "Google Meet",
        notes: "Budget freeze",
    },
];

fn seeded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 20, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

/// The fixed seed set, identical on every context so seeding never diverges
pub fn seed_bookings() -> Vec<Booking> {
    SEED_ROWS
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let date = NaiveDate::from_ymd_opt(2026, 3, row.day)?;
            let input = BookingInput {
                event_type: row.event_type.to_string(),
                attendee: Attendee::new(row.name, row.email, row.phone),
                date,
                time: row.time.to_string(),
                duration: row.duration.to_string(),
                status: row.status,
                location: row.location.to_string(),
                notes: row.notes.to_string(),
            };
            Some(Booking::from_input(
                BookingId::new(format!("{SEED_CONTEXT}-{}", index + 1)),
                input,
                seeded_at(),
                ContextId::new(SEED_CONTEXT),
            ))
        })
        .collect()
}
