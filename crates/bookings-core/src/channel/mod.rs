//! Replication channel connecting the live contexts of one session.
//!
//! Messages are JSON envelopes `{ "type": ..., "payload": ... }`. The
//! transport is fire-and-forget: a context that is not subscribed when a
//! message is published never sees it, and nothing is retried. Ordering is
//! only preserved within one publisher's stream.

mod broadcast;
mod noop;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{Error, Result};
use crate::models::{Booking, BookingId, ContextId};

pub use broadcast::{BroadcastChannel, BroadcastHub};
pub use noop::NoopChannel;

/// Wire message exchanged between replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    /// Full record of a newly created booking
    Create(Booking),
    /// Full resulting record after an update
    Update(Booking),
    /// Id of a removed booking
    Delete(BookingId),
    /// Complete snapshot, sent in reply to a sync request
    Sync(Vec<Booking>),
    /// A freshly opened context asking peers for their state
    SyncRequest(ContextId),
}

impl Envelope {
    /// Wire tag of this message
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "CREATE",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::Sync(_) => "SYNC",
            Self::SyncRequest(_) => "SYNC_REQUEST",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// One frame on the in-process transport
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) origin: ContextId,
    pub(crate) body: Arc<str>,
}

/// Publish/subscribe transport for replication envelopes
pub trait ReplicationChannel: Send + Sync + fmt::Debug {
    /// Logical channel name shared by all contexts of a session
    fn name(&self) -> &str;

    /// Send to every other live subscriber; never loops back to the sender
    fn publish(&self, envelope: &Envelope) -> Result<()>;

    /// Start receiving envelopes published by other contexts
    fn subscribe(&self) -> Subscription;

    /// Whether a real transport backs this channel
    fn is_connected(&self) -> bool;
}

/// Receiving side of a [`ReplicationChannel`]
#[derive(Debug)]
pub struct Subscription {
    inner: Option<Inbox>,
}

#[derive(Debug)]
struct Inbox {
    receiver: tokio::sync::broadcast::Receiver<Frame>,
    context: ContextId,
    channel: String,
}

impl Subscription {
    /// A subscription that never yields anything
    pub(crate) const fn closed() -> Self {
        Self { inner: None }
    }

    pub(crate) fn from_receiver(
        receiver: tokio::sync::broadcast::Receiver<Frame>,
        context: ContextId,
        channel: String,
    ) -> Self {
        Self {
            inner: Some(Inbox {
                receiver,
                context,
                channel,
            }),
        }
    }

    /// Next envelope from another context, or `None` once the transport is gone.
    ///
    /// Own frames, undecodable frames and lag gaps are skipped.
    pub async fn next(&mut self) -> Option<Envelope> {
        let inbox = self.inner.as_mut()?;
        loop {
            match inbox.receiver.recv().await {
                Ok(frame) => {
                    if frame.origin == inbox.context {
                        continue;
                    }
                    match Envelope::from_json(&frame.body) {
                        Ok(envelope) => return Some(envelope),
                        Err(error) => {
                            tracing::warn!(
                                channel = %inbox.channel,
                                origin = %frame.origin,
                                %error,
                                "Dropping undecodable replication frame"
                            );
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel = %inbox.channel,
                        context = %inbox.context,
                        skipped,
                        "Replication subscriber lagged; messages were lost"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Open the session channel for `context`.
///
/// Without a transport the replica degrades to a [`NoopChannel`] and keeps
/// working on its own data.
pub fn connect(
    hub: Option<&BroadcastHub>,
    name: &str,
    context: &ContextId,
) -> Arc<dyn ReplicationChannel> {
    if let Some(hub) = hub {
        return Arc::new(hub.open(name, context.clone()));
    }
    let error = Error::ChannelUnavailable(format!("no broadcast transport for '{name}'"));
    tracing::warn!(%context, %error, "Running as a single unsynchronized replica");
    Arc::new(NoopChannel::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attendee, BookingInput, BookingStatus};
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn booking() -> Booking {
        Booking::from_input(
            BookingId::new("a-1"),
            BookingInput {
                event_type: "Demo".into(),
                attendee: Attendee::new("Ann", "ann@x.com", ""),
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                time: "10:00 AM".into(),
                duration: "1 hour".into(),
                status: BookingStatus::Pending,
                location: String::new(),
                notes: String::new(),
            },
            Utc.with_ymd_and_hms(2026, 2, 27, 8, 0, 0).unwrap(),
            ContextId::new("a"),
        )
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&Envelope::Delete(BookingId::new("a-1")).to_json().unwrap())
                .unwrap();
        assert_eq!(json, serde_json::json!({"type": "DELETE", "payload": "a-1"}));

        let json = serde_json::to_value(Envelope::Create(booking())).unwrap();
        assert_eq!(json["type"], "CREATE");
        assert_eq!(json["payload"]["id"], "a-1");

        let json = serde_json::to_value(Envelope::SyncRequest(ContextId::new("b"))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "SYNC_REQUEST", "payload": "b"}));
    }

    #[test]
    fn test_envelope_decodes_sync_snapshot() {
        let wire = Envelope::Sync(vec![booking()]).to_json().unwrap();
        let decoded = Envelope::from_json(&wire).unwrap();
        assert_eq!(decoded.kind(), "SYNC");
        assert_eq!(decoded, Envelope::Sync(vec![booking()]));
    }

    #[test]
    fn test_envelope_rejects_unknown_type() {
        assert!(Envelope::from_json(r#"{"type":"PATCH","payload":"a-1"}"#).is_err());
    }

    #[tokio::test]
    async fn test_connect_without_hub_degrades_to_noop() {
        let channel = connect(None, "bookings", &ContextId::new("a"));
        assert!(!channel.is_connected());
        assert!(channel.publish(&Envelope::Delete(BookingId::new("x"))).is_ok());
        assert_eq!(channel.subscribe().next().await, None);
    }

    #[tokio::test]
    async fn test_subscription_skips_undecodable_frames() {
        let hub = BroadcastHub::new();
        let a = hub.open("bookings", ContextId::new("a"));
        let mut inbox = a.subscribe();

        hub.inject("bookings", ContextId::new("b"), "{not json");
        let b = hub.open("bookings", ContextId::new("b"));
        b.publish(&Envelope::Delete(BookingId::new("x"))).unwrap();

        assert_eq!(inbox.next().await, Some(Envelope::Delete(BookingId::new("x"))));
    }
}
