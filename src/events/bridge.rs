//! Bridges from the synchronous bus to async consumers.

use tokio::sync::{broadcast, mpsc};

use super::bus::EventSubscriber;
use super::types::ExecutionEvent;

/// Default capacity of the broadcast channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Fans events out to any number of remote listeners.
///
/// Sending never blocks; a listener that falls behind sees `Lagged` and
/// skips ahead.
#[derive(Clone)]
pub struct BroadcastBridge {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl BroadcastBridge {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBridge {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl EventSubscriber for BroadcastBridge {
    fn on_event(&self, event: &ExecutionEvent) {
        // No receivers is not an error.
        let _ = self.tx.send(event.clone());
    }
}

/// Forwards events into an unbounded queue for a single async consumer.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &ExecutionEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(
                event_type = event.event_type(),
                "channel subscriber receiver dropped"
            );
        }
    }
}
