//! bookings-core - Core library for the replicated booking store
//!
//! This crate contains the booking models, the per-context replica store,
//! the in-process replication channel, and the stats and bootstrap logic
//! used by every bookings client surface.

pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod seed;
pub mod services;
pub mod state;
pub mod stats;
pub mod store;
pub mod util;

pub use channel::{BroadcastHub, Envelope, ReplicationChannel};
pub use config::ReplicaConfig;
pub use error::{Error, Result};
pub use models::{
    Attendee, Booking, BookingId, BookingInput, BookingPatch, BookingStatus, ContextId, IdStrategy,
};
pub use services::{BootstrapOutcome, ReplicaService};
pub use state::SyncState;
pub use stats::Stats;
pub use store::{ApplyOutcome, BookingStore, StoreEvent};
