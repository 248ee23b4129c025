/// file: src/manager.rs
/// description: owns the single live transport session per credential and its state signal
use crate::{
    client::WebSocketTransport,
    connection::{Connection, ConnectionState, StateSignal, state_signal},
    transport::{Transport, TransportTask},
    types::Credential,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

struct Session {
    credential: Credential,
    connection: Arc<Connection>,
    task: TransportTask,
}

/// Keeps at most one transport open, keyed to the active credential.
///
/// Nothing here returns an error: a transport that cannot be established
/// simply leaves the state at [`ConnectionState::Disconnected`]. The session
/// is released on [`close`](Self::close), on credential change and on drop.
pub struct ConnectionManager<T: Transport = WebSocketTransport> {
    transport: T,
    signal: Arc<StateSignal>,
    session: Option<Session>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            signal: state_signal(),
            session: None,
        }
    }

    /// Opens a session for `credential`, replacing any session opened with a
    /// different one. `None` closes the current session.
    pub fn open(&mut self, credential: Option<Credential>) {
        if let (Some(session), Some(requested)) = (&self.session, &credential)
            && session.credential == *requested
            && !session.task.is_finished()
        {
            debug!(
                connection_id = %session.connection.id(),
                "Session already open for this credential"
            );
            return;
        }

        self.close();

        let Some(credential) = credential else {
            debug!("No credential, staying disconnected");
            return;
        };

        let connection = Connection::new(Arc::clone(&self.signal));
        match self
            .transport
            .establish(Arc::clone(&connection), &credential)
        {
            Ok(task) => {
                info!(connection_id = %connection.id(), "Transport session opened");
                self.session = Some(Session {
                    credential,
                    connection,
                    task,
                });
            }
            Err(e) => {
                connection.release();
                warn!("Failed to establish transport: {}", e);
            }
        }
    }

    /// Releases the current session, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            // Release before abort so a late callback cannot flip the state back.
            session.connection.release();
            session.task.abort();
            info!(connection_id = %session.connection.id(), "Transport session closed");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.signal.current()
    }

    /// Receives every connected/disconnected transition, across sessions,
    /// in order. A drop followed by a quick reconnect arrives as two events.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.signal.subscribe()
    }

    /// Latest state only; intermediate transitions may be skipped.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.signal.watch()
    }

    /// Live connection, for attaching listeners. Callers should keep only a
    /// `Weak` to it.
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.session.as_ref().map(|session| &session.connection)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.session.as_ref().map(|session| &session.credential)
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.close();
    }
}
