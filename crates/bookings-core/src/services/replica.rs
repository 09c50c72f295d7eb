//! Per-context replica service shared by every client surface.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{broadcast, Mutex};
use tokio::task::AbortHandle;

use crate::channel::{connect, BroadcastHub, Envelope, ReplicationChannel, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::config::ReplicaConfig;
use crate::models::{
    Booking, BookingId, BookingInput, BookingPatch, BookingStatus, ContextId, StaleUpdate,
};
use crate::seed::seed_bookings;
use crate::state::SyncState;
use crate::stats::Stats;
use crate::store::{BookingStore, StoreEvent};
use crate::Result;

/// How a context obtained its initial data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A peer answered; `applied` records changed local state
    Synced { applied: usize },
    /// Nobody answered; seed bookings were loaded
    SeededFallback { count: usize },
    /// Nobody answered and nothing was seeded
    Empty,
}

/// Aborts the listener task once the last service handle is gone
#[derive(Debug)]
struct ListenerGuard(AbortHandle);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Thread-safe handle to one replica and its listener task.
///
/// Clones share the replica. Dropping the last clone stops the listener
/// and releases the channel subscription.
#[derive(Debug, Clone)]
pub struct ReplicaService {
    store: Arc<Mutex<BookingStore>>,
    channel: Arc<dyn ReplicationChannel>,
    context: ContextId,
    sync_timeout: Duration,
    seed_on_empty: bool,
    state: Arc<std::sync::Mutex<SyncState>>,
    listener: Arc<ListenerGuard>,
}

impl ReplicaService {
    /// Open a replica on `hub` (or standalone when `hub` is `None`).
    ///
    /// Spawns the listener task, so this must run inside a Tokio runtime.
    pub fn start(config: &ReplicaConfig, hub: Option<&BroadcastHub>) -> Result<Self> {
        Self::start_with_clock(config, hub, Arc::new(SystemClock))
    }

    pub fn start_with_clock(
        config: &ReplicaConfig,
        hub: Option<&BroadcastHub>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let context = config.resolve_context_id();
        let channel = connect(hub, &config.channel_name, &context);
        // Subscribe before anything is published so no reply is missed.
        let subscription = channel.subscribe();

        let store = BookingStore::from_config(config, context.clone(), Arc::clone(&channel), clock);
        let store = Arc::new(Mutex::new(store));
        let initial = if channel.is_connected() {
            SyncState::Syncing
        } else {
            SyncState::Offline
        };
        let state = Arc::new(std::sync::Mutex::new(initial));

        let listener = tokio::spawn(listen(
            Arc::clone(&store),
            Arc::clone(&channel),
            Arc::clone(&state),
            subscription,
        ))
        .abort_handle();

        tracing::info!(
            %context,
            channel = %config.channel_name,
            strategy = config.id_strategy.as_str(),
            connected = channel.is_connected(),
            "Replica started"
        );

        Ok(Self {
            store,
            channel,
            context,
            sync_timeout: config.sync_timeout(),
            seed_on_empty: config.seed_on_empty,
            state,
            listener: Arc::new(ListenerGuard(listener)),
        })
    }

    pub const fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SyncState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Ask peers for their state and wait up to the sync timeout.
    ///
    /// Falls back to seed data when nobody answers and the store is empty.
    /// Replies arriving after the timeout are still merged by the listener.
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        if !self.channel.is_connected() {
            self.set_state(SyncState::Offline);
            return Ok(self.fallback().await);
        }

        self.set_state(SyncState::Syncing);
        let events = self.store.lock().await.watch();
        self.channel
            .publish(&Envelope::SyncRequest(self.context.clone()))?;

        if let Ok(Some(applied)) =
            tokio::time::timeout(self.sync_timeout, wait_for_sync(events)).await
        {
            self.set_state(SyncState::Synced);
            tracing::info!(context = %self.context, applied, "Bootstrapped from peer snapshot");
            return Ok(BootstrapOutcome::Synced { applied });
        }

        tracing::info!(
            context = %self.context,
            timeout = ?self.sync_timeout,
            "No peer answered the sync request"
        );
        self.set_state(SyncState::Standalone);
        Ok(self.fallback().await)
    }

    async fn fallback(&self) -> BootstrapOutcome {
        let mut store = self.store.lock().await;
        if !self.seed_on_empty || !store.is_empty() {
            return BootstrapOutcome::Empty;
        }
        let count = store.load_seed(seed_bookings());
        tracing::info!(context = %self.context, count, "Loaded seed bookings");
        BootstrapOutcome::SeededFallback { count }
    }

    /// Stop the listener; local operations keep working afterwards.
    pub fn shutdown(&self) {
        self.listener.0.abort();
        tracing::debug!(context = %self.context, "Replica listener stopped");
    }

    pub async fn create(&self, input: BookingInput) -> Result<Booking> {
        self.store.lock().await.create(input)
    }

    pub async fn update(&self, id: &BookingId, patch: BookingPatch) -> Result<Booking> {
        self.store.lock().await.update(id, patch)
    }

    pub async fn delete(&self, id: &BookingId) -> Result<()> {
        self.store.lock().await.delete(id)
    }

    pub async fn get(&self, id: &BookingId) -> Option<Booking> {
        self.store.lock().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Booking> {
        self.store.lock().await.all()
    }

    pub async fn by_status(&self, status: BookingStatus) -> Vec<Booking> {
        self.store.lock().await.by_status(status)
    }

    pub async fn by_date(&self, date: NaiveDate) -> Vec<Booking> {
        self.store.lock().await.by_date(date)
    }

    pub async fn upcoming(&self, window_days: u32) -> Vec<Booking> {
        self.store.lock().await.upcoming(window_days)
    }

    pub async fn search(&self, text: &str) -> Vec<Booking> {
        self.store.lock().await.search(text)
    }

    pub async fn stats(&self) -> Stats {
        self.store.lock().await.stats()
    }

    pub async fn snapshot(&self) -> Vec<Booking> {
        self.store.lock().await.snapshot()
    }

    pub async fn stale_updates(&self) -> Vec<StaleUpdate> {
        self.store.lock().await.stale_updates()
    }

    pub async fn tombstones(&self) -> usize {
        self.store.lock().await.tombstones()
    }

    pub async fn watch(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.lock().await.watch()
    }
}

async fn wait_for_sync(mut events: broadcast::Receiver<StoreEvent>) -> Option<usize> {
    loop {
        match events.recv().await {
            Ok(StoreEvent::Synced { applied }) => return Some(applied),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn listen(
    store: Arc<Mutex<BookingStore>>,
    channel: Arc<dyn ReplicationChannel>,
    state: Arc<std::sync::Mutex<SyncState>>,
    mut subscription: Subscription,
) {
    while let Some(envelope) = subscription.next().await {
        match envelope {
            Envelope::SyncRequest(requester) => {
                let snapshot = {
                    let store = store.lock().await;
                    let syncing =
                        *state.lock().unwrap_or_else(PoisonError::into_inner) == SyncState::Syncing;
                    // An empty replica still waiting on its own bootstrap has
                    // nothing to offer; answering would end the peer's wait early.
                    if syncing && store.is_empty() {
                        continue;
                    }
                    store.snapshot()
                };
                tracing::debug!(%requester, records = snapshot.len(), "Answering sync request");
                if let Err(error) = channel.publish(&Envelope::Sync(snapshot)) {
                    tracing::warn!(%requester, %error, "Failed to answer sync request");
                }
            }
            other => {
                store.lock().await.apply_remote(other);
            }
        }
    }
    tracing::debug!(channel = channel.name(), "Replication subscription ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Attendee, IdStrategy};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn config(context: &str, timeout_ms: u64) -> ReplicaConfig {
        ReplicaConfig {
            context_id: Some(context.to_string()),
            id_strategy: IdStrategy::Sequenced,
            sync_timeout_ms: timeout_ms,
            ..ReplicaConfig::default()
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn input(name: &str) -> BookingInput {
        BookingInput {
            event_type: "Product Demo".into(),
            attendee: Attendee::new(name, format!("{name}@x.com"), ""),
            date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            time: "11:00 AM".into(),
            duration: "1 hour".into(),
            status: BookingStatus::Pending,
            location: "Zoom".into(),
            notes: String::new(),
        }
    }

    async fn settle<F, Fut>(mut done: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if done().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("replicas did not settle");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_context_falls_back_to_seed() {
        let hub = BroadcastHub::new();
        let replica = ReplicaService::start_with_clock(&config("a", 20), Some(&hub), clock())
            .unwrap();

        let outcome = replica.bootstrap().await.unwrap();
        assert_eq!(
            outcome,
            BootstrapOutcome::SeededFallback {
                count: seed_bookings().len()
            }
        );
        assert_eq!(replica.state(), SyncState::Standalone);
        assert_eq!(replica.all().await.len(), seed_bookings().len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_late_joiner_receives_peer_state() {
        let hub = BroadcastHub::new();
        let a = ReplicaService::start_with_clock(&config("a", 20), Some(&hub), clock()).unwrap();
        a.bootstrap().await.unwrap();
        a.create(input("ann")).await.unwrap();

        let b = ReplicaService::start_with_clock(&config("b", 1_000), Some(&hub), clock())
            .unwrap();
        let outcome = b.bootstrap().await.unwrap();

        assert_eq!(
            outcome,
            BootstrapOutcome::Synced {
                applied: seed_bookings().len() + 1
            }
        );
        assert_eq!(b.state(), SyncState::Synced);
        assert_eq!(b.all().await, a.all().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_without_seed_bootstrap_reports_empty() {
        let hub = BroadcastHub::new();
        let mut cfg = config("a", 10);
        cfg.seed_on_empty = false;
        let replica = ReplicaService::start_with_clock(&cfg, Some(&hub), clock()).unwrap();

        assert_eq!(replica.bootstrap().await.unwrap(), BootstrapOutcome::Empty);
        assert!(replica.all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_degraded_mode_still_mutates() {
        let replica = ReplicaService::start_with_clock(&config("solo", 10), None, clock()).unwrap();
        assert_eq!(replica.state(), SyncState::Offline);
        replica.bootstrap().await.unwrap();

        let created = replica.create(input("ann")).await.unwrap();
        let updated = replica
            .update(&created.id, BookingPatch::status(BookingStatus::Confirmed))
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Confirmed);
        replica.delete(&created.id).await.unwrap();
        assert!(replica.get(&created.id).await.is_none());
        assert_eq!(replica.state(), SyncState::Offline);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replicas_converge_after_concurrent_mutations() {
        let hub = BroadcastHub::new();
        let a = ReplicaService::start_with_clock(&config("a", 20), Some(&hub), clock()).unwrap();
        a.bootstrap().await.unwrap();
        let b = ReplicaService::start_with_clock(&config("b", 1_000), Some(&hub), clock())
            .unwrap();
        b.bootstrap().await.unwrap();

        let from_a = a.create(input("ann")).await.unwrap();
        let from_b = b.create(input("bob")).await.unwrap();
        assert_ne!(from_a.id, from_b.id);

        let seed_id = BookingId::new("seed-2");
        a.update(&seed_id, BookingPatch::status(BookingStatus::Confirmed))
            .await
            .unwrap();
        b.delete(&BookingId::new("seed-6")).await.unwrap();

        settle(|| {
            let (a, b) = (a.clone(), b.clone());
            async move { a.all().await == b.all().await }
        })
        .await;

        let state = a.all().await;
        assert_eq!(state.len(), seed_bookings().len() + 1);
        assert_eq!(
            b.get(&seed_id).await.map(|booking| booking.status),
            Some(BookingStatus::Confirmed)
        );
        assert_eq!(a.stats().await, b.stats().await);

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watch_reports_remote_changes() {
        let hub = BroadcastHub::new();
        let a = ReplicaService::start_with_clock(&config("a", 10), Some(&hub), clock()).unwrap();
        let b = ReplicaService::start_with_clock(&config("b", 10), Some(&hub), clock()).unwrap();
        let mut events = b.watch().await;

        let created = a.create(input("ann")).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            StoreEvent::Created {
                id: created.id,
                origin: crate::store::Origin::Remote
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reopened_context_does_not_reuse_sequenced_ids() {
        let hub = BroadcastHub::new();
        let mut tab_config = config("tab", 20);
        tab_config.seed_on_empty = false;
        let mut peer_config = config("peer", 1_000);
        peer_config.seed_on_empty = false;

        let tab = ReplicaService::start_with_clock(&tab_config, Some(&hub), clock()).unwrap();
        assert_eq!(tab.bootstrap().await.unwrap(), BootstrapOutcome::Empty);
        let first = tab.create(input("ann")).await.unwrap();
        let peer = ReplicaService::start_with_clock(&peer_config, Some(&hub), clock()).unwrap();
        assert_eq!(
            peer.bootstrap().await.unwrap(),
            BootstrapOutcome::Synced { applied: 1 }
        );
        tab.shutdown();
        drop(tab);

        tab_config.sync_timeout_ms = 1_000;
        let tab = ReplicaService::start_with_clock(&tab_config, Some(&hub), clock()).unwrap();
        assert_eq!(
            tab.bootstrap().await.unwrap(),
            BootstrapOutcome::Synced { applied: 1 }
        );
        let second = tab.create(input("bob")).await.unwrap();
        assert_ne!(second.id, first.id);

        settle(|| {
            let peer = peer.clone();
            async move { peer.all().await.len() == 2 }
        })
        .await;
        assert_eq!(peer.get(&first.id).await, Some(first));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_replica_stops_listening() {
        let hub = BroadcastHub::new();
        {
            let ghost =
                ReplicaService::start_with_clock(&config("ghost", 10), Some(&hub), clock()).unwrap();
            ghost.bootstrap().await.unwrap();
            assert!(!ghost.all().await.is_empty());
        }
        settle(|| {
            let idle = hub.subscriber_count("bookings") == 0;
            async move { idle }
        })
        .await;

        let mut cfg = config("fresh", 20);
        cfg.seed_on_empty = false;
        let fresh = ReplicaService::start_with_clock(&cfg, Some(&hub), clock()).unwrap();
        assert_eq!(fresh.bootstrap().await.unwrap(), BootstrapOutcome::Empty);
        assert!(fresh.all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_late_sync_reply_is_merged_after_timeout() {
        let hub = BroadcastHub::new();
        let mut cfg = config("b", 10);
        cfg.seed_on_empty = false;
        let b = ReplicaService::start_with_clock(&cfg, Some(&hub), clock()).unwrap();
        assert_eq!(b.bootstrap().await.unwrap(), BootstrapOutcome::Empty);
        assert_eq!(b.state(), SyncState::Standalone);

        let slow_peer = hub.open("bookings", ContextId::new("late"));
        let record = Booking::from_input(
            BookingId::new("late-1"),
            input("ann"),
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            ContextId::new("late"),
        );
        slow_peer
            .publish(&Envelope::Sync(vec![record.clone()]))
            .unwrap();

        settle(|| {
            let b = b.clone();
            async move { b.get(&BookingId::new("late-1")).await.is_some() }
        })
        .await;
        assert_eq!(b.all().await, vec![record]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_syncing_replica_does_not_answer() {
        let hub = BroadcastHub::new();
        let a = ReplicaService::start_with_clock(&config("a", 1_000), Some(&hub), clock()).unwrap();
        assert_eq!(a.state(), SyncState::Syncing);

        let requester = hub.open("bookings", ContextId::new("x"));
        let mut inbox = requester.subscribe();
        requester
            .publish(&Envelope::SyncRequest(ContextId::new("x")))
            .unwrap();
        let silence = tokio::time::timeout(Duration::from_millis(50), inbox.next()).await;
        assert!(silence.is_err(), "empty syncing replica answered");

        let created = a.create(input("ann")).await.unwrap();
        assert_eq!(inbox.next().await, Some(Envelope::Create(created.clone())));

        requester
            .publish(&Envelope::SyncRequest(ContextId::new("x")))
            .unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), inbox.next())
            .await
            .unwrap();
        assert_eq!(reply, Some(Envelope::Sync(vec![created])));
    }
}
