//! Named-topic publish/subscribe event bus.
//!
//! Every state transition inside the core — supervisor or child — is
//! published here; it is the *only* mechanism an external observer (a
//! streaming HTTP endpoint, a test) uses to watch the system.
//!
//! `send` never awaits and never blocks: each subscriber owns a small
//! ring buffer guarded by a plain mutex, so delivery is a synchronous
//! push from the publisher's point of view. A subscriber that falls
//! behind has its oldest queued event silently replaced by the newest one
//! rather than ever stalling the publisher (spec §9, "Backpressure on
//! event subscribers"); a `tokio::sync::Notify` wakes whoever is waiting
//! in `EventReceiver::recv`.

// Layer 1: Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// Layer 2: Third-party crate imports
use tokio::sync::Notify;

// Layer 3: Internal module imports
use crate::info::{ChildInfo, ServerInfo};
use crate::types::{ChildState, ServerState};

/// Topic carrying supervisor-level `ServerState` transitions.
pub const TOPIC_SERVER_STATE: &str = "server_state";
/// Topic carrying child-level `ChildState` transitions.
pub const TOPIC_PROCESS_STATE: &str = "process_state";

/// Default per-subscriber ring-buffer capacity before drop-oldest kicks in.
const DEFAULT_CAPACITY: usize = 256;

/// Opaque handle returned by [`EventBus::connect`], used to
/// [`EventBus::disconnect`] that exact registration later. Because topics
/// hold a multiset of subscribers, the same handler (in spirit — here, the
/// same receiving queue) may be registered more than once under distinct
/// ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A publication on `server_state` or `process_state`.
///
/// This is exactly the payload a boundary adapter serializes for the
/// `/stream` endpoint (spec §6): `event_type`, `old_state`, `new_state`,
/// and an info snapshot of the sender.
#[derive(Debug, Clone)]
pub enum Event {
    ServerState {
        old: ServerState,
        new: ServerState,
        server: ServerInfo,
    },
    ProcessState {
        old: ChildState,
        new: ChildState,
        process: ChildInfo,
    },
}

impl Event {
    /// The topic this event belongs to.
    pub fn topic(&self) -> &'static str {
        match self {
            Event::ServerState { .. } => TOPIC_SERVER_STATE,
            Event::ProcessState { .. } => TOPIC_PROCESS_STATE,
        }
    }
}

struct Queue {
    buffer: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Push `event`, dropping the oldest queued entry first if already at
    /// capacity. Never blocks.
    #[allow(clippy::unwrap_used)]
    fn push(&self, event: Event) {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
        drop(buffer);
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

struct Subscriber {
    id: SubscriptionId,
    queue: Arc<Queue>,
}

/// The receiving half of one [`EventBus::connect`] registration.
pub struct EventReceiver {
    queue: Arc<Queue>,
}

impl EventReceiver {
    /// Wait for the next event on this subscription. Resolves to `None`
    /// once [`EventBus::disconnect`] has removed this subscription and no
    /// buffered events remain.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Non-blocking poll: `Some(event)` if one was queued, `None`
    /// otherwise (whether or not the subscription is still connected).
    #[allow(clippy::unwrap_used)]
    pub fn try_recv(&mut self) -> Option<Event> {
        self.queue.buffer.lock().unwrap().pop_front()
    }
}

/// Process-local, named-topic publish/subscribe bus.
///
/// `connect`/`disconnect`/`send` mirror the contract in spec §4.1 exactly:
/// ordering within a topic matches send order, identical subscriptions may
/// coexist (a multiset), and a handler is expected to drain its queue
/// promptly rather than block the publisher.
pub struct EventBus {
    topics: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Register a new subscriber on `topic`. Returns the subscription id
    /// (for [`EventBus::disconnect`]) and the receiving end of its private
    /// bounded queue.
    #[allow(clippy::unwrap_used)]
    pub fn connect(&self, topic: impl Into<String>) -> (SubscriptionId, EventReceiver) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(Queue::new(self.capacity));
        let mut topics = self.topics.lock().unwrap();
        topics.entry(topic.into()).or_default().push(Subscriber {
            id,
            queue: queue.clone(),
        });
        (id, EventReceiver { queue })
    }

    /// Remove one registration. A no-op if `id` is not currently
    /// registered on `topic` (already disconnected, or never was). Any
    /// [`EventReceiver`] still held by the caller returns `None` from
    /// `recv` once its buffer drains.
    #[allow(clippy::unwrap_used)]
    pub fn disconnect(&self, topic: &str, id: SubscriptionId) {
        let mut topics = self.topics.lock().unwrap();
        if let Some(subscribers) = topics.get_mut(topic) {
            if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
                let removed = subscribers.remove(pos);
                removed.queue.close();
            }
        }
    }

    /// Publish `event` to every subscriber of its topic, in the order they
    /// registered. Never blocks: a full subscriber queue has its oldest
    /// entry dropped to make room.
    #[allow(clippy::unwrap_used)]
    pub fn send(&self, event: Event) {
        let topic = event.topic();
        let topics = self.topics.lock().unwrap();
        let Some(subscribers) = topics.get(topic) else {
            return;
        };
        for subscriber in subscribers {
            subscriber.queue.push(event.clone());
        }
    }

    /// Number of currently-registered subscribers across all topics, for
    /// diagnostics and tests.
    #[allow(clippy::unwrap_used)]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.lock().unwrap().get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::ServerInfo;

    fn sample_event(new: ServerState) -> Event {
        Event::ServerState {
            old: ServerState::Stopped,
            new,
            server: ServerInfo {
                name: "test".into(),
                hostname: "localhost".into(),
                pid: 1,
                start_time: None,
                state: new,
            },
        }
    }

    #[tokio::test]
    async fn delivers_in_send_order() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.connect(TOPIC_SERVER_STATE);
        bus.send(sample_event(ServerState::Starting));
        bus.send(sample_event(ServerState::Running));

        let first = rx.recv().await.expect("first event");
        let second = rx.recv().await.expect("second event");
        match (first, second) {
            (
                Event::ServerState { new: ServerState::Starting, .. },
                Event::ServerState { new: ServerState::Running, .. },
            ) => {}
            other => panic!("unexpected order: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_stops_delivery_even_if_receiver_is_kept() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.connect(TOPIC_SERVER_STATE);
        bus.disconnect(TOPIC_SERVER_STATE, id);
        bus.send(sample_event(ServerState::Starting));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn multiple_independent_subscribers_both_receive() {
        let bus = EventBus::new();
        let (_a, mut rx_a) = bus.connect(TOPIC_SERVER_STATE);
        let (_b, mut rx_b) = bus.connect(TOPIC_SERVER_STATE);
        bus.send(sample_event(ServerState::Starting));
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_rather_than_blocking() {
        let bus = EventBus::with_capacity(1);
        let (_id, mut rx) = bus.connect(TOPIC_SERVER_STATE);
        bus.send(sample_event(ServerState::Starting));
        // Queue is now full (capacity 1); this send must not block, and
        // must evict the Starting event rather than the Running one.
        bus.send(sample_event(ServerState::Running));

        let Event::ServerState { new, .. } = rx.recv().await.expect("one event survives") else {
            panic!("unexpected event kind");
        };
        assert_eq!(new, ServerState::Running);
        assert!(rx.try_recv().is_none());
    }
}
