//! Stale update model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookingId, ContextId};

/// Conflict strategy name recorded on every discard
pub const LWW_STRATEGY: &str = "lww";

/// An incoming replica update that lost last-writer-wins and was discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleUpdate {
    /// Booking involved in the conflict
    pub booking_id: BookingId,
    /// Local version's timestamp when the conflict occurred
    pub local_updated_at: DateTime<Utc>,
    /// Incoming version's timestamp that was rejected
    pub incoming_updated_at: DateTime<Utc>,
    /// Replica that wrote the rejected version
    pub incoming_updated_by: ContextId,
    /// Resolution time
    pub resolved_at: DateTime<Utc>,
    /// Resolution strategy name
    pub strategy: String,
}
