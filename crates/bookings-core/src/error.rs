//! Error types for bookings-core

use thiserror::Error;

use crate::models::BookingId;

/// Result type alias using bookings-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bookings-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Update or delete referenced an id this replica does not hold
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// No broadcast transport in this runtime; the replica runs standalone
    #[error("Replication channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
