//! Degraded transport used when no broadcast primitive exists.

use super::{Envelope, ReplicationChannel, Subscription};
use crate::error::Result;

/// Accepts every publish and delivers nothing
#[derive(Debug, Clone)]
pub struct NoopChannel {
    name: String,
}

impl NoopChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ReplicationChannel for NoopChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, envelope: &Envelope) -> Result<()> {
        tracing::trace!(channel = %self.name, kind = envelope.kind(), "Dropped message (no transport)");
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::closed()
    }

    fn is_connected(&self) -> bool {
        false
    }
}
