//! Publish/subscribe fan-out of [`SessionEvent`]s.
//!
//! Every subscriber owns a bounded queue. `publish` walks subscribers in
//! registration order and enqueues without waiting: a full queue drops the
//! event for that subscriber only, a closed queue unregisters it.
//! [`EventBus::subscribe_listener`] drains a queue on its own task so a
//! failing or slow listener never affects the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wabridge_core::{EventKind, SessionEvent};

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Token returned by `subscribe`; pass to [`EventBus::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Failure reported by a listener. Logged by the bus, never propagated.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

/// Consumer of session events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one event.
    async fn on_event(&self, event: &SessionEvent) -> Result<(), ListenerError>;
}

/// A channel subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Token for unsubscribing.
    pub id: SubscriptionId,
    /// Events matching the subscription's kinds, in publish order.
    pub receiver: mpsc::Receiver<SessionEvent>,
}

struct Subscriber {
    id: SubscriptionId,
    name: String,
    kinds: Vec<EventKind>,
    tx: mpsc::Sender<SessionEvent>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Fan-out hub between the connector and its consumers.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the default queue depth.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus whose subscriber queues hold `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Register a channel subscriber for the given kinds.
    pub fn subscribe(&self, name: &str, kinds: &[EventKind]) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, receiver) = mpsc::channel(self.capacity);
        self.subscribers.write().push(Subscriber {
            id,
            name: name.to_owned(),
            kinds: kinds.to_vec(),
            tx,
        });
        debug!(subscriber = name, ?kinds, "subscriber registered");
        Subscription { id, receiver }
    }

    /// Register a listener; it runs on its own task until unsubscribed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_listener(
        &self,
        kinds: &[EventKind],
        listener: Arc<dyn EventListener>,
    ) -> (SubscriptionId, JoinHandle<()>) {
        let Subscription { id, mut receiver } = self.subscribe(listener.name(), kinds);
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = listener.on_event(&event).await {
                    warn!(
                        listener = listener.name(),
                        event_type = event.kind().wire_name(),
                        error = %e,
                        "listener failed"
                    );
                }
            }
            debug!(listener = listener.name(), "listener stopped");
        });
        (id, handle)
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    /// Deliver an event to every matching subscriber without blocking.
    pub fn publish(&self, event: SessionEvent) {
        let kind = event.kind();
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for sub in subscribers.iter().filter(|s| s.wants(kind)) {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        counter!("event_bus_drops_total").increment(1);
                        warn!(
                            subscriber = %sub.name,
                            event_type = kind.wire_name(),
                            "subscriber queue full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(sub.id),
                }
            }
        }
        if !closed.is_empty() {
            self.subscribers.write().retain(|s| !closed.contains(&s.id));
            debug!(count = closed.len(), "pruned closed subscribers");
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use wabridge_core::ConnectionState;

    fn challenge(code: &str) -> SessionEvent {
        SessionEvent::PairingChallenge { code: code.into() }
    }

    struct Recording {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventListener for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_event(&self, event: &SessionEvent) -> Result<(), ListenerError> {
            if let SessionEvent::PairingChallenge { code } = event {
                self.seen.lock().push(format!("{}:{code}", self.name));
            }
            if self.fail {
                Err(ListenerError("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn delivers_only_subscribed_kinds() {
        let bus = EventBus::new();
        let mut qr = bus.subscribe("qr", &[EventKind::PairingChallenge]);
        let mut chats = bus.subscribe("chats", &[EventKind::ChatsUpdate]);

        bus.publish(challenge("c1"));

        assert_eq!(qr.receiver.try_recv().unwrap(), challenge("c1"));
        assert!(chats.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn preserves_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("all", &EventKind::ALL);
        bus.publish(challenge("a"));
        bus.publish(SessionEvent::ConnectionUpdate {
            phase: wabridge_core::ConnectionPhase::Connecting,
            state: ConnectionState::disconnected(),
            reason: None,
        });
        bus.publish(challenge("b"));

        assert_eq!(sub.receiver.recv().await.unwrap(), challenge("a"));
        assert_eq!(
            sub.receiver.recv().await.unwrap().kind(),
            EventKind::ConnectionUpdate
        );
        assert_eq!(sub.receiver.recv().await.unwrap(), challenge("b"));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("qr", &[EventKind::PairingChallenge]);
        bus.unsubscribe(sub.id);
        bus.publish(challenge("x"));
        assert_eq!(bus.subscriber_count(), 0);
        // sender dropped on unsubscribe, so the channel reports closed
        assert!(sub.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let bus = EventBus::with_capacity(1);
        let mut slow = bus.subscribe("slow", &[EventKind::PairingChallenge]);
        let mut fast = bus.subscribe("fast", &[EventKind::PairingChallenge]);

        bus.publish(challenge("1"));
        let _ = fast.receiver.recv().await;
        bus.publish(challenge("2"));

        assert_eq!(slow.receiver.try_recv().unwrap(), challenge("1"));
        assert!(slow.receiver.try_recv().is_err());
        assert_eq!(fast.receiver.try_recv().unwrap(), challenge("2"));
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe("gone", &[EventKind::PairingChallenge]);
        drop(sub);
        bus.publish(challenge("x"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn failing_listener_does_not_block_others() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (_, failing) = bus.subscribe_listener(
            &[EventKind::PairingChallenge],
            Arc::new(Recording {
                name: "failing".into(),
                seen: seen.clone(),
                fail: true,
            }),
        );
        let (_, healthy) = bus.subscribe_listener(
            &[EventKind::PairingChallenge],
            Arc::new(Recording {
                name: "healthy".into(),
                seen: seen.clone(),
                fail: false,
            }),
        );

        bus.publish(challenge("1"));
        bus.publish(challenge("2"));

        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.lock().len() < 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let seen = seen.lock().clone();
        assert!(seen.contains(&"healthy:1".to_string()));
        assert!(seen.contains(&"healthy:2".to_string()));
        assert!(seen.contains(&"failing:2".to_string()));
        failing.abort();
        healthy.abort();
    }

    #[tokio::test]
    async fn listener_task_ends_on_unsubscribe() {
        let bus = EventBus::new();
        let (id, handle) = bus.subscribe_listener(
            &[EventKind::PairingChallenge],
            Arc::new(Recording {
                name: "r".into(),
                seen: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }),
        );
        bus.unsubscribe(id);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
