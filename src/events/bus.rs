//! Synchronous publish/subscribe for coordinator events.

use std::sync::{Arc, Mutex};

use super::types::ExecutionEvent;

/// Receives every event published on a bus.
///
/// Called synchronously from inside the coordinator operation that produced
/// the event, so implementations must not call back into the coordinator.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

impl<F> EventSubscriber for F
where
    F: Fn(&ExecutionEvent) + Send + Sync,
{
    fn on_event(&self, event: &ExecutionEvent) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Delivers events to subscribers in subscription order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Returns false when the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn publish(&self, event: &ExecutionEvent) {
        tracing::trace!(
            event_type = event.event_type(),
            unit_path = event.unit_path(),
            subscribers = self.subscribers.len(),
            "publishing event"
        );
        for (_, subscriber) in &self.subscribers {
            subscriber.on_event(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Subscriber that keeps every event it sees, in order.
#[derive(Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event type names in delivery order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(ExecutionEvent::event_type).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSubscriber for EventLog {
    fn on_event(&self, event: &ExecutionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
