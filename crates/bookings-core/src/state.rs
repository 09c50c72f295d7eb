//! Shared replica state types.

use serde::Serialize;

/// Replication state of one context, surfaced to the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No transport in this runtime; running as a single replica
    Offline,
    /// Waiting for a peer snapshot
    Syncing,
    /// Merged at least one peer snapshot
    Synced,
    /// No peer answered; running on local or seed data
    Standalone,
}
