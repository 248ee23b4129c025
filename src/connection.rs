/// file: src/connection.rs
/// description: shared connection handle, state signal and per-channel listener registry
use crate::{
    monitoring::{CONNECTED_GAUGE, DROPPED_COUNTER, MESSAGES_RECEIVED_COUNTER},
    types::{Channel, InboundMessage},
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => f.write_str("CONNECTED"),
            ConnectionState::Disconnected => f.write_str("DISCONNECTED"),
        }
    }
}

// Transitions buffered per subscriber before it starts lagging.
const TRANSITION_CAPACITY: usize = 64;

/// Manager-wide state signal. Outlives individual connections so subscribers
/// keep observing across credential changes.
///
/// `current` only holds the latest value. Every transition is also sent on
/// `transitions`, so a drop and a quick reconnect reach subscribers as two
/// events instead of collapsing into one.
#[derive(Debug)]
pub struct StateSignal {
    current: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
}

impl StateSignal {
    pub fn current(&self) -> ConnectionState {
        *self.current.borrow()
    }

    /// Every transition from now on. A subscriber that falls more than
    /// 64 transitions behind gets `RecvError::Lagged` with the number it missed.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    /// Latest-value view, for waiting on a particular state.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.current.subscribe()
    }

    fn publish(&self, state: ConnectionState) {
        self.current.send_replace(state);
        // No subscribers is fine.
        let _ = self.transitions.send(state);
    }
}

pub fn state_signal() -> Arc<StateSignal> {
    Arc::new(StateSignal {
        current: watch::channel(ConnectionState::Disconnected).0,
        transitions: broadcast::channel(TRANSITION_CAPACITY).0,
    })
}

/// Callback invoked with the raw payload of every message on its channel.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub messages_received: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub reconnect_count: AtomicU64,
    last_message_time: Mutex<Option<DateTime<Utc>>>,
}

impl ConnectionStats {
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        *self.last_message_time.lock() = Some(Utc::now());
    }

    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn last_message_time(&self) -> Option<DateTime<Utc>> {
        *self.last_message_time.lock()
    }
}

#[derive(Debug)]
struct Link {
    state: ConnectionState,
    released: bool,
}

/// One transport session. The manager owns it (and its transport task); feeds
/// only hold `Weak` references to register listeners.
pub struct Connection {
    id: Uuid,
    signal: Arc<StateSignal>,
    link: Mutex<Link>,
    listeners: RwLock<HashMap<Channel, Vec<(ListenerId, Listener)>>>,
    next_listener: AtomicU64,
    stats: ConnectionStats,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("link", &*self.link.lock())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Connection {
    pub fn new(signal: Arc<StateSignal>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            signal,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                released: false,
            }),
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            stats: ConnectionStats::default(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub fn is_released(&self) -> bool {
        self.link.lock().released
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Called by the transport on connect/disconnect. Publishes only real
    /// transitions, and nothing at all once the connection is released.
    pub fn set_state(&self, next: ConnectionState) -> bool {
        let mut link = self.link.lock();
        if link.released || link.state == next {
            return false;
        }
        link.state = next;
        self.publish(next);
        true
    }

    /// Marks the session dead. Late callbacks from an aborting transport task
    /// become no-ops after this returns.
    pub fn release(&self) {
        let mut link = self.link.lock();
        if link.released {
            return;
        }
        link.released = true;
        if link.state == ConnectionState::Connected {
            link.state = ConnectionState::Disconnected;
            self.publish(ConnectionState::Disconnected);
        }
        debug!(connection_id = %self.id, "Connection released");
    }

    fn publish(&self, state: ConnectionState) {
        info!(connection_id = %self.id, "Connection state -> {}", state);
        CONNECTED_GAUGE.set(match state {
            ConnectionState::Connected => 1.0,
            ConnectionState::Disconnected => 0.0,
        });
        self.signal.publish(state);
    }

    pub fn on<F>(&self, channel: Channel, listener: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let listener: Listener = Arc::new(listener);
        self.listeners
            .write()
            .entry(channel)
            .or_default()
            .push((id, listener));
        trace!(connection_id = %self.id, %channel, "Listener registered");
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        for registered in listeners.values_mut() {
            if let Some(pos) = registered.iter().position(|(lid, _)| *lid == id) {
                registered.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// Routes one inbound text frame. Returns how many listeners saw it.
    pub fn dispatch(&self, text: &str) -> usize {
        if self.is_released() {
            trace!(connection_id = %self.id, "Ignoring frame on released connection");
            return 0;
        }

        self.stats.record_message();
        MESSAGES_RECEIVED_COUNTER.increment(1);

        let routed = InboundMessage::parse(text).and_then(|msg| {
            let channel = msg.channel()?;
            Ok((channel, msg.payload))
        });

        match routed {
            Ok((channel, payload)) => self.emit(channel, payload),
            Err(e) => {
                self.stats.record_dropped();
                DROPPED_COUNTER.increment(1);
                warn!(
                    "Dropping unroutable frame: {}. Message: {}",
                    e,
                    text.chars().take(100).collect::<String>()
                );
                0
            }
        }
    }

    /// Delivers a decoded event to every listener on `channel`.
    pub fn emit(&self, channel: Channel, payload: Value) -> usize {
        if self.is_released() {
            return 0;
        }

        // Snapshot so listeners can detach themselves without deadlocking.
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .get(&channel)
            .map(|registered| registered.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        if targets.is_empty() {
            debug!(%channel, "No listeners for channel");
        }
        for listener in &targets {
            listener(payload.clone());
        }
        targets.len()
    }
}
