/// file: src/feed.rs
/// description: bounded most-recent-first event history fed by channel listeners
use crate::{
    config::DEFAULT_FEED_CAPACITY,
    connection::{Connection, ListenerId},
    events::{FeedUpdate, UpdateSender, notify},
    manager::ConnectionManager,
    monitoring::{EVENTS_RECORDED_COUNTER, EVICTIONS_COUNTER},
    transport::Transport,
    types::{Channel, EventRecord},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tracing::{debug, trace};
use uuid::Uuid;

/// Fixed-capacity sequence, newest first. Pushing at capacity evicts the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct RetainedFeed {
    records: VecDeque<EventRecord>,
    capacity: usize,
}

impl RetainedFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepends `record`, returning whatever fell off the tail.
    pub fn push(&mut self, record: EventRecord) -> Option<EventRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_back()
        } else {
            None
        };
        self.records.push_front(record);
        evicted
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.records.iter().cloned().collect()
    }
}

impl Default for RetainedFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

// State shared with the listener closures.
struct FeedShared {
    retained: Mutex<RetainedFeed>,
    total_recorded: AtomicU64,
    last_event_time: Mutex<Option<DateTime<Utc>>>,
    updates: Option<UpdateSender>,
}

impl FeedShared {
    /// Stores `payload` unless the attachment behind `live` has been detached.
    /// The flag is checked under the same lock `detach` takes to clear it, so
    /// a dispatch already in flight cannot store anything once `detach` returns.
    fn record(&self, live: &AtomicBool, channel: Channel, payload: Value) {
        let (record, evicted) = {
            let mut retained = self.retained.lock();
            if !live.load(Ordering::Acquire) {
                trace!(%channel, "Listener outlived its attachment, message ignored");
                return;
            }
            // Stamped under the lock so receipt time never decreases front to back.
            let record = EventRecord::receive(channel, payload);
            let evicted = retained.push(record.clone());
            (record, evicted)
        };

        self.total_recorded.fetch_add(1, Ordering::Relaxed);
        *self.last_event_time.lock() = Some(record.received_at);
        EVENTS_RECORDED_COUNTER.increment(1);
        if let Some(old) = evicted {
            EVICTIONS_COUNTER.increment(1);
            trace!(evicted_id = %old.id, "Feed at capacity, evicted oldest record");
        }
        trace!(record_id = %record.id, %channel, "Recorded event");

        if let Some(updates) = &self.updates {
            notify(updates, FeedUpdate::Recorded(Arc::new(record)));
        }
    }
}

struct Attachment {
    connection_id: Uuid,
    connection: Weak<Connection>,
    listeners: Vec<ListenerId>,
    live: Arc<AtomicBool>,
}

/// Turns channel messages on a connection into retained [`EventRecord`]s.
///
/// Listener registration is keyed to connection identity: attaching to the
/// connection already attached does nothing, attaching elsewhere detaches
/// first, and dropping the feed detaches.
pub struct EventFeed {
    shared: Arc<FeedShared>,
    channels: Vec<Channel>,
    attachment: Option<Attachment>,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Like [`new`](Self::new), also publishing each change to `updates`.
    pub fn with_updates(capacity: usize, updates: UpdateSender) -> Self {
        Self::build(capacity, Some(updates))
    }

    fn build(capacity: usize, updates: Option<UpdateSender>) -> Self {
        Self {
            shared: Arc::new(FeedShared {
                retained: Mutex::new(RetainedFeed::new(capacity)),
                total_recorded: AtomicU64::new(0),
                last_event_time: Mutex::new(None),
                updates,
            }),
            channels: Channel::ALL.to_vec(),
            attachment: None,
        }
    }

    /// Restricts the subscription to `channels`. An empty list keeps the full
    /// table. Takes effect on the next attach.
    pub fn with_channels(mut self, channels: &[Channel]) -> Self {
        if !channels.is_empty() {
            let mut selected = channels.to_vec();
            selected.sort();
            selected.dedup();
            self.channels = selected;
        }
        self
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Registers one listener per channel on `connection`. `None` leaves the
    /// feed idle.
    pub fn attach(&mut self, connection: Option<&Arc<Connection>>) {
        let Some(connection) = connection else {
            self.detach();
            return;
        };
        if self.attached_to() == Some(connection.id()) {
            return;
        }
        self.detach();

        let live = Arc::new(AtomicBool::new(true));
        let listeners = self
            .channels
            .iter()
            .map(|&channel| {
                let shared = Arc::clone(&self.shared);
                let live = Arc::clone(&live);
                connection.on(channel, move |payload| {
                    shared.record(&live, channel, payload)
                })
            })
            .collect();

        debug!(
            connection_id = %connection.id(),
            channels = self.channels.len(),
            "Feed attached"
        );
        self.attachment = Some(Attachment {
            connection_id: connection.id(),
            connection: Arc::downgrade(connection),
            listeners,
            live,
        });
    }

    /// Re-attaches to whatever connection `manager` currently holds.
    pub fn follow<T: Transport>(&mut self, manager: &ConnectionManager<T>) {
        self.attach(manager.connection());
    }

    pub fn detach(&mut self) {
        let Some(attachment) = self.attachment.take() else {
            return;
        };
        // Dispatch snapshots listeners, so one of ours may still be running.
        {
            let _retained = self.shared.retained.lock();
            attachment.live.store(false, Ordering::Release);
        }
        if let Some(connection) = attachment.connection.upgrade() {
            for id in attachment.listeners {
                connection.off(id);
            }
        }
        debug!(connection_id = %attachment.connection_id, "Feed detached");
    }

    pub fn attached_to(&self) -> Option<Uuid> {
        self.attachment.as_ref().map(|a| a.connection_id)
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn clear(&self) {
        let removed = self.shared.retained.lock().clear();
        debug!(removed, "Feed cleared");
        if let Some(updates) = &self.shared.updates {
            notify(updates, FeedUpdate::Cleared { removed });
        }
    }

    /// Newest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.shared.retained.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.shared.retained.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.retained.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.retained.lock().capacity()
    }

    pub fn total_recorded(&self) -> u64 {
        self.shared.total_recorded.load(Ordering::Relaxed)
    }

    pub fn last_event_time(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_event_time.lock()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::{ConnectionState, state_signal},
        events::create_update_channel,
        transport::mock::MockTransport,
        types::Credential,
    };
    use serde_json::json;
    use std::collections::HashSet;

    fn connection() -> Arc<Connection> {
        Connection::new(state_signal())
    }

    fn record(n: i64) -> EventRecord {
        EventRecord::receive(Channel::DisasterUpdate, json!({ "n": n }))
    }

    #[test]
    fn retained_feed_evicts_oldest() {
        let mut retained = RetainedFeed::new(2);
        assert!(retained.push(record(1)).is_none());
        assert!(retained.push(record(2)).is_none());
        let evicted = retained.push(record(3)).unwrap();

        assert_eq!(evicted.payload(), &json!({"n": 1}));
        let payloads: Vec<_> = retained.iter().map(|r| r.payload().clone()).collect();
        assert_eq!(payloads, vec![json!({"n": 3}), json!({"n": 2})]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut retained = RetainedFeed::new(0);
        retained.push(record(1));
        retained.push(record(2));
        assert_eq!(retained.len(), 1);
        assert_eq!(retained.capacity(), 1);
    }

    #[test]
    fn records_newest_first_across_channels() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));

        conn.dispatch(r#"{"channel":"disaster-update","payload":{"id":7}}"#);
        conn.dispatch(r#"{"channel":"resource-update","payload":{"id":3}}"#);

        let records = feed.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].channel(), Channel::ResourceUpdate);
        assert_eq!(records[0].payload(), &json!({"id": 3}));
        assert_eq!(records[1].channel(), Channel::DisasterUpdate);
        assert_eq!(records[1].payload(), &json!({"id": 7}));
        assert!(records[0].received_at >= records[1].received_at);
    }

    #[test]
    fn capacity_two_keeps_last_two() {
        let conn = connection();
        let mut feed = EventFeed::new(2);
        feed.attach(Some(&conn));

        for name in ["A", "B", "C"] {
            conn.emit(Channel::ReportUpdate, json!(name));
        }

        let payloads: Vec<_> = feed.records().iter().map(|r| r.payload().clone()).collect();
        assert_eq!(payloads, vec![json!("C"), json!("B")]);
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_most_recent() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));

        for i in 0..120 {
            let channel = Channel::ALL[i % Channel::ALL.len()];
            conn.emit(channel, json!(i));
            assert!(feed.len() <= DEFAULT_FEED_CAPACITY);
        }

        let records = feed.records();
        assert_eq!(records.len(), DEFAULT_FEED_CAPACITY);
        let expected: Vec<_> = (70..120).rev().map(|i| json!(i)).collect();
        let actual: Vec<_> = records.iter().map(|r| r.payload().clone()).collect();
        assert_eq!(actual, expected);
        assert_eq!(feed.total_recorded(), 120);
    }

    #[test]
    fn ids_are_unique_even_for_identical_events() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));

        for _ in 0..40 {
            conn.emit(Channel::SocialMediaUpdated, json!({"same": true}));
        }

        let ids: HashSet<_> = feed.records().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 40);
    }

    #[test]
    fn malformed_payloads_are_stored_opaquely() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));

        conn.dispatch(r#"["disaster-update", "not an object"]"#);
        conn.dispatch(r#"{"channel":"report-update"}"#);

        let records = feed.records();
        assert_eq!(records[0].payload(), &Value::Null);
        assert_eq!(records[1].payload(), &json!("not an object"));
    }

    #[test]
    fn clear_empties_without_touching_listeners() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));
        conn.emit(Channel::DisasterUpdate, json!(1));
        conn.emit(Channel::DisasterUpdate, json!(2));

        feed.clear();
        assert!(feed.records().is_empty());
        assert!(feed.is_attached());
        assert_eq!(conn.listener_count(), Channel::ALL.len());

        conn.emit(Channel::DisasterUpdate, json!(3));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn detach_stops_recording() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));
        conn.emit(Channel::DisasterUpdate, json!(1));

        feed.detach();
        assert_eq!(conn.listener_count(), 0);
        for channel in Channel::ALL {
            conn.emit(channel, json!(2));
        }
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn message_in_flight_during_detach_is_not_recorded() {
        let conn = connection();
        let feed = Arc::new(Mutex::new(EventFeed::default()));

        // Registered ahead of the feed, so it runs first within the same
        // dispatch and detaches the feed while the feed's listener is
        // already in the dispatch snapshot.
        let detacher = Arc::clone(&feed);
        conn.on(Channel::DisasterUpdate, move |_| detacher.lock().detach());
        feed.lock().attach(Some(&conn));

        conn.emit(Channel::DisasterUpdate, json!({"id": 1}));

        let feed = feed.lock();
        assert!(!feed.is_attached());
        assert!(feed.is_empty());
        assert_eq!(feed.total_recorded(), 0);
        assert_eq!(conn.listener_count(), 1);
    }

    #[test]
    fn reattaching_same_connection_does_not_double_count() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));
        feed.attach(Some(&conn));

        assert_eq!(conn.listener_count(), Channel::ALL.len());
        conn.emit(Channel::ResourceUpdate, json!(1));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn attaching_elsewhere_detaches_first() {
        let old = connection();
        let new = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&old));
        feed.attach(Some(&new));

        assert_eq!(old.listener_count(), 0);
        assert_eq!(feed.attached_to(), Some(new.id()));
        old.emit(Channel::DisasterUpdate, json!("stale"));
        new.emit(Channel::DisasterUpdate, json!("fresh"));

        let records = feed.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload(), &json!("fresh"));
    }

    #[test]
    fn absent_connection_leaves_feed_idle() {
        let mut feed = EventFeed::default();
        feed.attach(None);
        assert!(!feed.is_attached());
        assert!(feed.is_empty());
    }

    #[test]
    fn channel_subset_ignores_other_channels() {
        let conn = connection();
        let mut feed = EventFeed::default().with_channels(&[Channel::ReportUpdate]);
        feed.attach(Some(&conn));

        conn.emit(Channel::DisasterUpdate, json!(1));
        conn.emit(Channel::ReportUpdate, json!(2));

        assert_eq!(conn.listener_count(), 1);
        assert_eq!(feed.records()[0].channel(), Channel::ReportUpdate);
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn drop_detaches() {
        let conn = connection();
        {
            let mut feed = EventFeed::default();
            feed.attach(Some(&conn));
            assert_eq!(conn.listener_count(), Channel::ALL.len());
        }
        assert_eq!(conn.listener_count(), 0);
    }

    #[test]
    fn follow_tracks_manager_connection() {
        let transport = MockTransport::default();
        let mut manager = ConnectionManager::new(transport.clone());
        let mut feed = EventFeed::default();

        feed.follow(&manager);
        assert!(!feed.is_attached());

        manager.open(Some(Credential::new("a")));
        feed.follow(&manager);
        let first = transport.last();
        first.set_state(ConnectionState::Connected);
        first.emit(Channel::DisasterUpdate, json!(1));

        manager.close();
        manager.open(Some(Credential::new("a")));
        feed.follow(&manager);
        let second = transport.last();

        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), Channel::ALL.len());
        second.emit(Channel::DisasterUpdate, json!(2));

        let payloads: Vec<_> = feed.records().iter().map(|r| r.payload().clone()).collect();
        assert_eq!(payloads, vec![json!(2), json!(1)]);
    }

    #[test]
    fn state_changes_do_not_touch_records() {
        let conn = connection();
        let mut feed = EventFeed::default();
        feed.attach(Some(&conn));
        conn.emit(Channel::DisasterUpdate, json!(1));
        let before = feed.records();

        conn.set_state(ConnectionState::Connected);
        conn.set_state(ConnectionState::Connected);
        conn.set_state(ConnectionState::Disconnected);
        assert_eq!(feed.records(), before);
    }

    #[test]
    fn publishes_updates() {
        let (tx, mut rx) = create_update_channel();
        let conn = connection();
        let mut feed = EventFeed::with_updates(5, tx);
        feed.attach(Some(&conn));

        conn.emit(Channel::ResourceUpdate, json!({"id": 9}));
        feed.clear();

        match rx.try_recv() {
            Ok(FeedUpdate::Recorded(record)) => {
                assert_eq!(record.channel(), Channel::ResourceUpdate);
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(FeedUpdate::Cleared { removed: 1 })
        ));
    }
}
