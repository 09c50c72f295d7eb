//! Replicated booking store
//!
//! Each context owns one [`BookingStore`]. Local mutations are applied
//! synchronously and then published on the replication channel; messages
//! from other contexts go through [`BookingStore::apply_remote`], which
//! resolves conflicts with last-writer-wins on `(updatedAt, updatedBy)`.
//!
//! Deleted ids are remembered (id only) so that a late `CREATE`, `UPDATE`
//! or snapshot entry cannot bring a removed booking back. The set is never
//! pruned: it lives as long as the replica and grows by one id per deletion.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use tokio::sync::broadcast;

use crate::channel::{Envelope, ReplicationChannel};
use crate::clock::Clock;
use crate::config::{ReplicaConfig, DEFAULT_STALE_LOG_CAPACITY};
use crate::error::{Error, Result};
use crate::models::{
    Booking, BookingId, BookingInput, BookingPatch, BookingStatus, ContextId, IdGenerator,
    IdStrategy, StaleUpdate, LWW_STRATEGY,
};
use crate::stats::{compute_stats, Stats};

const WATCH_CAPACITY: usize = 256;

/// Where a change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// Change notification for UI layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Created { id: BookingId, origin: Origin },
    Updated { id: BookingId, origin: Origin },
    Deleted { id: BookingId, origin: Origin },
    /// A peer snapshot was merged; `applied` records changed local state
    Synced { applied: usize },
    /// Seed data was loaded because no peer answered
    Seeded { count: usize },
}

/// Result of applying one remote envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state changed
    Applied,
    /// Duplicate, already-deleted or otherwise no-op message
    Ignored,
    /// Update lost last-writer-wins and was discarded
    Stale,
}

enum Merge {
    Inserted,
    Replaced,
    Unchanged,
    Stale,
}

/// In-memory replica of the session's bookings
#[derive(Debug)]
pub struct BookingStore {
    context: ContextId,
    ids: IdGenerator,
    bookings: HashMap<BookingId, Booking>,
    /// Tombstones; cleared only when the replica is dropped
    deleted: HashSet<BookingId>,
    stale: VecDeque<StaleUpdate>,
    stale_capacity: usize,
    channel: Arc<dyn ReplicationChannel>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<StoreEvent>,
}

impl BookingStore {
    /// Create an empty replica publishing on `channel`
    pub fn new(
        context: ContextId,
        strategy: IdStrategy,
        channel: Arc<dyn ReplicationChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            ids: IdGenerator::new(strategy, context.clone()),
            context,
            bookings: HashMap::new(),
            deleted: HashSet::new(),
            stale: VecDeque::new(),
            stale_capacity: DEFAULT_STALE_LOG_CAPACITY,
            channel,
            clock,
            events,
        }
    }

    /// Create an empty replica from configuration
    pub fn from_config(
        config: &ReplicaConfig,
        context: ContextId,
        channel: Arc<dyn ReplicationChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(context, config.id_strategy, channel, clock)
            .with_stale_capacity(config.stale_log_capacity)
    }

    /// Bound the stale-update log
    #[must_use]
    pub fn with_stale_capacity(mut self, capacity: usize) -> Self {
        self.stale_capacity = capacity;
        self
    }

    pub const fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn channel(&self) -> &Arc<dyn ReplicationChannel> {
        &self.channel
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Subscribe to change notifications
    pub fn watch(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ---------------------------------------------------------------------
    // Local mutations
    // ---------------------------------------------------------------------

    /// Create a booking, publish it, and return the stored record
    pub fn create(&mut self, input: BookingInput) -> Result<Booking> {
        input.attendee.validate()?;

        let id = self.mint_id();
        let now = self.clock.now();
        let booking = Booking::from_input(id.clone(), input, now, self.context.clone());
        self.bookings.insert(id.clone(), booking.clone());

        tracing::debug!(context = %self.context, %id, "Created booking");
        self.publish(&Envelope::Create(booking.clone()));
        self.notify(StoreEvent::Created {
            id,
            origin: Origin::Local,
        });
        Ok(booking)
    }

    /// Next id that is neither live nor deleted on this replica
    fn mint_id(&mut self) -> BookingId {
        loop {
            let id = self.ids.next_id();
            if !self.bookings.contains_key(&id) && !self.deleted.contains(&id) {
                return id;
            }
            tracing::debug!(context = %self.context, %id, "Skipped id already in use");
        }
    }

    /// Merge `patch` into an existing booking and publish the full result
    pub fn update(&mut self, id: &BookingId, patch: BookingPatch) -> Result<Booking> {
        patch.validate()?;
        let now = self.clock.now();
        let context = self.context.clone();
        let booking = self
            .bookings
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;

        let stamp = next_version_time(now, booking.updated_at);
        booking.apply_patch(patch, stamp, context);
        let booking = booking.clone();

        tracing::debug!(context = %self.context, %id, "Updated booking");
        self.publish(&Envelope::Update(booking.clone()));
        self.notify(StoreEvent::Updated {
            id: id.clone(),
            origin: Origin::Local,
        });
        Ok(booking)
    }

    /// Remove a booking and publish the deletion
    pub fn delete(&mut self, id: &BookingId) -> Result<()> {
        if self.bookings.remove(id).is_none() {
            return Err(Error::NotFound(id.clone()));
        }
        self.deleted.insert(id.clone());

        tracing::debug!(context = %self.context, %id, "Deleted booking");
        self.publish(&Envelope::Delete(id.clone()));
        self.notify(StoreEvent::Deleted {
            id: id.clone(),
            origin: Origin::Local,
        });
        Ok(())
    }

    /// Load seed records into an empty replica without publishing them
    pub fn load_seed(&mut self, seed: Vec<Booking>) -> usize {
        let mut count = 0;
        for booking in seed {
            self.ids.observe(&booking.id);
            if self.deleted.contains(&booking.id) || self.bookings.contains_key(&booking.id) {
                continue;
            }
            self.bookings.insert(booking.id.clone(), booking);
            count += 1;
        }
        self.notify(StoreEvent::Seeded { count });
        count
    }

    // ---------------------------------------------------------------------
    // Remote application
    // ---------------------------------------------------------------------

    /// Apply a message received from another context.
    ///
    /// `CREATE` and `UPDATE` both carry a full record and go through the
    /// same last-writer-wins merge, so a duplicate create is a no-op and an
    /// update for an unseen id stands in for the missed create.
    ///
    /// Never publishes. `SYNC_REQUEST` is answered by the replica service,
    /// so the store ignores it.
    pub fn apply_remote(&mut self, envelope: Envelope) -> ApplyOutcome {
        let kind = envelope.kind();
        let outcome = match envelope {
            Envelope::Create(booking) | Envelope::Update(booking) => {
                self.apply_remote_version(booking)
            }
            Envelope::Delete(id) => self.apply_remote_delete(id),
            Envelope::Sync(snapshot) => self.apply_snapshot(snapshot),
            Envelope::SyncRequest(_) => ApplyOutcome::Ignored,
        };
        tracing::debug!(context = %self.context, kind, ?outcome, "Applied remote message");
        outcome
    }

    fn apply_remote_version(&mut self, booking: Booking) -> ApplyOutcome {
        let id = booking.id.clone();
        match self.merge(booking) {
            Merge::Inserted => {
                self.notify(StoreEvent::Created {
                    id,
                    origin: Origin::Remote,
                });
                ApplyOutcome::Applied
            }
            Merge::Replaced => {
                self.notify(StoreEvent::Updated {
                    id,
                    origin: Origin::Remote,
                });
                ApplyOutcome::Applied
            }
            Merge::Unchanged => ApplyOutcome::Ignored,
            Merge::Stale => ApplyOutcome::Stale,
        }
    }

    fn apply_remote_delete(&mut self, id: BookingId) -> ApplyOutcome {
        self.ids.observe(&id);
        let removed = self.bookings.remove(&id).is_some();
        self.deleted.insert(id.clone());
        if !removed {
            return ApplyOutcome::Ignored;
        }
        self.notify(StoreEvent::Deleted {
            id,
            origin: Origin::Remote,
        });
        ApplyOutcome::Applied
    }

    fn apply_snapshot(&mut self, snapshot: Vec<Booking>) -> ApplyOutcome {
        let received = snapshot.len();
        let mut applied = 0;
        for booking in snapshot {
            if matches!(self.merge(booking), Merge::Inserted | Merge::Replaced) {
                applied += 1;
            }
        }
        tracing::info!(
            context = %self.context,
            received,
            applied,
            "Merged peer snapshot"
        );
        self.notify(StoreEvent::Synced { applied });
        if applied > 0 {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Ignored
        }
    }

    /// Last-writer-wins merge of one full record
    fn merge(&mut self, incoming: Booking) -> Merge {
        self.ids.observe(&incoming.id);
        if self.deleted.contains(&incoming.id) {
            return Merge::Unchanged;
        }
        let Some(local) = self.bookings.get_mut(&incoming.id) else {
            self.bookings.insert(incoming.id.clone(), incoming);
            return Merge::Inserted;
        };
        if incoming.supersedes(local) {
            *local = incoming;
            return Merge::Replaced;
        }
        if *local == incoming {
            return Merge::Unchanged;
        }

        let stale = StaleUpdate {
            booking_id: incoming.id,
            local_updated_at: local.updated_at,
            incoming_updated_at: incoming.updated_at,
            incoming_updated_by: incoming.updated_by,
            resolved_at: self.clock.now(),
            strategy: LWW_STRATEGY.to_string(),
        };
        tracing::info!(
            context = %self.context,
            booking_id = %stale.booking_id,
            local_updated_at = %stale.local_updated_at,
            incoming_updated_at = %stale.incoming_updated_at,
            "Discarded stale update"
        );
        self.record_stale(stale);
        Merge::Stale
    }

    fn record_stale(&mut self, stale: StaleUpdate) {
        if self.stale_capacity == 0 {
            return;
        }
        while self.stale.len() >= self.stale_capacity {
            self.stale.pop_front();
        }
        self.stale.push_back(stale);
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    /// Every booking, ordered by date
    pub fn all(&self) -> Vec<Booking> {
        self.collect(|_| true)
    }

    pub fn by_status(&self, status: BookingStatus) -> Vec<Booking> {
        self.collect(|booking| booking.status == status)
    }

    pub fn by_date(&self, date: NaiveDate) -> Vec<Booking> {
        self.collect(|booking| booking.date == date)
    }

    /// Bookings dated from today through `today + window_days`, inclusive
    pub fn upcoming(&self, window_days: u32) -> Vec<Booking> {
        let today = self.clock.today();
        let end = today
            .checked_add_days(Days::new(u64::from(window_days)))
            .unwrap_or(NaiveDate::MAX);
        self.collect(|booking| booking.date >= today && booking.date <= end)
    }

    /// Case-insensitive match on attendee name/email, event type and notes.
    ///
    /// A blank query matches everything.
    pub fn search(&self, text: &str) -> Vec<Booking> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return self.all();
        }
        self.collect(|booking| booking.matches_text(&needle))
    }

    /// Aggregate counts for today's date
    pub fn stats(&self) -> Stats {
        compute_stats(self.bookings.values(), self.clock.today())
    }

    /// Full state for a `SYNC` reply
    pub fn snapshot(&self) -> Vec<Booking> {
        self.all()
    }

    /// Recently discarded stale updates, oldest first
    pub fn stale_updates(&self) -> Vec<StaleUpdate> {
        self.stale.iter().cloned().collect()
    }

    /// Number of deleted ids remembered by this replica
    pub fn tombstones(&self) -> usize {
        self.deleted.len()
    }

    fn collect(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .values()
            .filter(|booking| keep(booking))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        bookings
    }

    fn publish(&self, envelope: &Envelope) {
        if let Err(error) = self.channel.publish(envelope) {
            tracing::warn!(
                context = %self.context,
                kind = envelope.kind(),
                %error,
                "Failed to publish replication message"
            );
        }
    }

    fn notify(&self, event: StoreEvent) {
        // No watchers is fine.
        let _ = self.events.send(event);
    }
}

/// Timestamp for a new local version: never at or before the previous one
fn next_version_time(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}
