/// file: src/transport.rs
/// description: seam between the connection manager and whatever drives the wire
use crate::{connection::Connection, error::FeedError, types::Credential};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Something that can drive a [`Connection`]: report connect/disconnect via
/// `set_state` and hand inbound frames to `dispatch`. Reconnecting after an
/// unexpected drop is the transport's business, not the manager's.
pub trait Transport: Send + Sync {
    fn establish(
        &self,
        connection: Arc<Connection>,
        credential: &Credential,
    ) -> Result<TransportTask, FeedError>;
}

/// Handle to the background work behind a connection. Dropping it aborts
/// the work.
#[derive(Debug, Default)]
pub struct TransportTask {
    handle: Option<JoinHandle<()>>,
}

impl TransportTask {
    pub fn spawned(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// For transports that are driven externally.
    pub fn detached() -> Self {
        Self::default()
    }

    /// True once spawned work has exited on its own. Detached tasks never
    /// finish.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }

    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TransportTask {
    fn drop(&mut self) {
        self.abort();
    }
}
