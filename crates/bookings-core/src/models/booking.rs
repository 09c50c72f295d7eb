//! Booking model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ContextId;
use crate::error::{Error, Result};
use crate::util::{contains_folded, is_blank};

/// A booking identifier, unique across every replica of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    /// Wrap an existing identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BookingId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Validation("booking id cannot be empty".into()));
        }
        Ok(Self(s.to_string()))
    }
}

/// Lifecycle status of a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Pending,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [Self; 4] = [
        Self::Confirmed,
        Self::Pending,
        Self::Completed,
        Self::Cancelled,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| Error::Validation(format!("unknown booking status '{s}'")))
    }
}

/// Contact details of the person a booking is for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl Attendee {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    /// Name and email are required; phone is optional
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if is_blank(&self.name) {
            missing.push("name");
        }
        if is_blank(&self.email) {
            missing.push("email");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "attendee {} required",
                missing.join(" and ")
            )))
        }
    }
}

/// Everything a caller supplies to create a booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingInput {
    pub event_type: String,
    pub attendee: Attendee,
    pub date: NaiveDate,
    pub time: String,
    pub duration: String,
    pub status: BookingStatus,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
}

/// Partial update; present fields replace the stored ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee: Option<Attendee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BookingPatch {
    /// Patch that only changes the status
    #[must_use]
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.event_type.is_none()
            && self.attendee.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.duration.is_none()
            && self.status.is_none()
            && self.location.is_none()
            && self.notes.is_none()
    }

    /// Validate the fields this patch would write
    pub fn validate(&self) -> Result<()> {
        self.attendee.as_ref().map_or(Ok(()), Attendee::validate)
    }

    fn merge_into(self, booking: &mut Booking) {
        if let Some(event_type) = self.event_type {
            booking.event_type = event_type;
        }
        if let Some(attendee) = self.attendee {
            booking.attendee = attendee;
        }
        if let Some(date) = self.date {
            booking.date = date;
        }
        if let Some(time) = self.time {
            booking.time = time;
        }
        if let Some(duration) = self.duration {
            booking.duration = duration;
        }
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(location) = self.location {
            booking.location = location;
        }
        if let Some(notes) = self.notes {
            booking.notes = notes;
        }
    }
}

/// A booking record as held by every replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Unique identifier
    pub id: BookingId,
    /// Kind of meeting (e.g. "30-min Consultation")
    pub event_type: String,
    pub attendee: Attendee,
    /// Calendar day; the only field time-window queries look at
    pub date: NaiveDate,
    /// Display time, never parsed
    pub time: String,
    pub duration: String,
    pub status: BookingStatus,
    pub location: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    /// Last-writer-wins timestamp
    pub updated_at: DateTime<Utc>,
    /// Replica that produced this version; breaks `updated_at` ties
    pub updated_by: ContextId,
}

impl Booking {
    /// Build a fresh record from caller input
    #[must_use]
    pub fn from_input(
        id: BookingId,
        input: BookingInput,
        now: DateTime<Utc>,
        context: ContextId,
    ) -> Self {
        Self {
            id,
            event_type: input.event_type,
            attendee: input.attendee,
            date: input.date,
            time: input.time,
            duration: input.duration,
            status: input.status,
            location: input.location,
            notes: input.notes,
            created_at: now,
            updated_at: now,
            updated_by: context,
        }
    }

    /// The caller-supplied part of this record
    #[must_use]
    pub fn input(&self) -> BookingInput {
        BookingInput {
            event_type: self.event_type.clone(),
            attendee: self.attendee.clone(),
            date: self.date,
            time: self.time.clone(),
            duration: self.duration.clone(),
            status: self.status,
            location: self.location.clone(),
            notes: self.notes.clone(),
        }
    }

    /// Apply a patch and stamp the new version
    pub(crate) fn apply_patch(&mut self, patch: BookingPatch, at: DateTime<Utc>, by: ContextId) {
        patch.merge_into(self);
        self.updated_at = at;
        self.updated_by = by;
    }

    /// Whether this version wins last-writer-wins against `other`.
    ///
    /// Newer `updated_at` wins; equal timestamps fall back to the writer id.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        (self.updated_at, &self.updated_by) > (other.updated_at, &other.updated_by)
    }

    /// Free-text match over attendee name/email, event type and notes.
    ///
    /// `needle` must already be lowercase.
    #[must_use]
    pub fn matches_text(&self, needle: &str) -> bool {
        contains_folded(&self.attendee.name, needle)
            || contains_folded(&self.attendee.email, needle)
            || contains_folded(&self.event_type, needle)
            || contains_folded(&self.notes, needle)
    }
}
