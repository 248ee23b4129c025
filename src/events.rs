/// file: src/events.rs
/// description: update bus decoupling the feed from presentation
use crate::{
    connection::ConnectionState, monitoring::UPDATES_DROPPED_COUNTER, types::EventRecord,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub enum FeedUpdate {
    StateChanged(ConnectionState),
    Recorded(Arc<EventRecord>),
    Cleared { removed: usize },
}

// Bounded so a stalled consumer cannot grow memory. Listeners run on the
// transport task and must not block, so overflow is dropped, not awaited.
const UPDATE_CHANNEL_CAPACITY: usize = 1_024;

pub type UpdateSender = mpsc::Sender<FeedUpdate>;
pub type UpdateReceiver = mpsc::Receiver<FeedUpdate>;

pub fn create_update_channel() -> (UpdateSender, UpdateReceiver) {
    mpsc::channel(UPDATE_CHANNEL_CAPACITY)
}

/// Non-blocking send. Returns false when the update was dropped.
pub fn notify(sender: &UpdateSender, update: FeedUpdate) -> bool {
    match sender.try_send(update) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            UPDATES_DROPPED_COUNTER.increment(1);
            debug!("Update channel full, dropping update");
            false
        }
        Err(TrySendError::Closed(_)) => {
            trace!("Update receiver gone");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_reports_delivery() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(notify(&tx, FeedUpdate::Cleared { removed: 1 }));
        assert!(!notify(&tx, FeedUpdate::Cleared { removed: 2 }));
        assert!(matches!(
            rx.try_recv(),
            Ok(FeedUpdate::Cleared { removed: 1 })
        ));
        drop(rx);
        assert!(!notify(
            &tx,
            FeedUpdate::StateChanged(ConnectionState::Connected)
        ));
    }
}
