use std::collections::HashMap;
use std::sync::Arc;

use af_domain::Event;
use parking_lot::RwLock;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Per-run ordered event log fan-out (§2, §4.7). Durable storage still
/// lives in `ResourceStore`; this is purely the "tail from here forward"
/// distribution mechanism — a `tokio::sync::broadcast` channel per run,
/// created lazily on first publish or subscribe and dropped once its last
/// subscriber and publisher both go away.
pub struct EventStream {
    channels: RwLock<HashMap<String, broadcast::Sender<Event>>>,
    available: RwLock<bool>,
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStream {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            available: RwLock::new(true),
        }
    }

    /// Simulate the event stream being unreachable (§4.7 step 5, §4.8): the
    /// event gateway must degrade to polling the store when this is false.
    pub fn set_available(&self, available: bool) {
        *self.available.write() = available;
    }

    pub fn is_available(&self) -> bool {
        *self.available.read()
    }

    fn sender_for(&self, run_id: &str) -> broadcast::Sender<Event> {
        if let Some(tx) = self.channels.read().get(run_id) {
            return tx.clone();
        }
        let mut guard = self.channels.write();
        guard
            .entry(run_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish one event to any current subscribers. Publishing to a run
    /// with no subscribers is a (cheap) no-op — callers don't need to check
    /// first.
    pub fn publish(&self, event: Event) {
        let tx = self.sender_for(&event.run_id);
        let _ = tx.send(event);
    }

    pub fn subscribe(&self, run_id: &str) -> broadcast::Receiver<Event> {
        self.sender_for(run_id).subscribe()
    }
}

pub type SharedEventStream = Arc<EventStream>;

#[cfg(test)]
mod tests {
    use super::*;
    use af_domain::CanonicalEventType;
    use serde_json::Value;

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let stream = EventStream::new();
        let mut rx = stream.subscribe("run-1");
        for seq in 1..=3 {
            stream.publish(Event::new(
                "run-1".into(),
                seq,
                CanonicalEventType::Message,
                Value::Null,
            ));
        }
        for expected in 1..=3 {
            let e = rx.recv().await.unwrap();
            assert_eq!(e.seq, expected);
        }
    }

    #[test]
    fn publish_with_no_subscribers_is_a_no_op() {
        let stream = EventStream::new();
        stream.publish(Event::new(
            "run-1".into(),
            1,
            CanonicalEventType::Message,
            Value::Null,
        ));
    }
}
