//! In-process broadcast transport.
//!
//! One `tokio::sync::broadcast` sender per logical channel name stands in
//! for the browser's broadcast primitive: every endpoint opened under the
//! same name sees every frame published after it subscribed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use super::{Envelope, Frame, ReplicationChannel, Subscription};
use crate::error::Result;
use crate::models::ContextId;

/// Frames buffered per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 1024;

/// Registry of named broadcast channels shared by all contexts in a process
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Frame>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an endpoint on channel `name` for `context`
    pub fn open(&self, name: &str, context: ContextId) -> BroadcastChannel {
        BroadcastChannel {
            name: name.to_string(),
            context,
            sender: self.sender(name),
        }
    }

    /// Number of live subscriptions on channel `name`
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, name: &str) -> broadcast::Sender<Frame> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Push a raw frame, bypassing envelope encoding
    #[cfg(test)]
    pub(crate) fn inject(&self, name: &str, origin: ContextId, body: &str) {
        let _ = self.sender(name).send(Frame {
            origin,
            body: body.into(),
        });
    }
}

/// One context's endpoint on a [`BroadcastHub`] channel
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    name: String,
    context: ContextId,
    sender: broadcast::Sender<Frame>,
}

impl ReplicationChannel for BroadcastChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, envelope: &Envelope) -> Result<()> {
        let body = envelope.to_json()?;
        let frame = Frame {
            origin: self.context.clone(),
            body: body.into(),
        };
        // `send` only fails when nobody is listening, which is not an error here.
        let receivers = self.sender.send(frame).unwrap_or(0);
        tracing::trace!(
            channel = %self.name,
            context = %self.context,
            kind = envelope.kind(),
            receivers,
            "Published replication message"
        );
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::from_receiver(
            self.sender.subscribe(),
            self.context.clone(),
            self.name.clone(),
        )
    }

    fn is_connected(&self) -> bool {
        true
    }
}
