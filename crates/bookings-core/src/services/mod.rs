//! Service wrappers shared across client surfaces.

mod replica;

pub use replica::{BootstrapOutcome, ReplicaService};
