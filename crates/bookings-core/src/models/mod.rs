//! Data models for Bookings

mod booking;
mod context;
mod stale_update;

pub use booking::{Attendee, Booking, BookingId, BookingInput, BookingPatch, BookingStatus};
pub use context::{ContextId, IdGenerator, IdStrategy};
pub use stale_update::{StaleUpdate, LWW_STRATEGY};
