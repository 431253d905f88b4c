//! In-process event broadcast.
//!
//! The poller and HTTP handlers publish index updates and signed attestations
//! here. Subscribers get an independent buffer; slow subscribers lag and drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use depeg_types::events::{Event, EventType};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, event_type = ?event.event_type, "event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Build and emit an event from any serializable payload.
    pub fn publish<T: serde::Serialize>(&self, event_type: EventType, timestamp: u64, payload: &T) {
        let payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        self.emit(Event {
            event_type,
            timestamp,
            payload,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(EventType::DaemonStatus, 1000, &serde_json::json!({"version": "0.1.0"}));

        let event = rx.try_recv().expect("receive event");
        assert_eq!(event.event_type, EventType::DaemonStatus);
        assert_eq!(event.payload["version"], "0.1.0");
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(EventType::IndexUpdated, 1, &"USDC");
        assert_eq!(bus.sequence(), 1);
    }
}
