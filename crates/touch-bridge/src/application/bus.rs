//! Touch event fan-out to connected clients.
//!
//! The device task publishes each flushed batch once; the bus renders every
//! event to JSON a single time and hands the same `Arc<str>` to each
//! subscriber's bounded queue.
//!
//! A subscriber that cannot keep up is not allowed to hold back the others:
//! when its queue is full the bus drops it from the registry and cancels its
//! eviction token.  The connection notices the token and closes with a
//! backpressure reason.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use touch_core::{TouchEvent, TouchKind, WireMessage};

/// Identifies one client connection for its whole lifetime.
pub type ConnectionId = Uuid;

/// Default per-subscriber queue capacity, in payloads.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A touch currently on the surface, as last published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveTouch {
    pub id: i32,
    pub x: i32,
    pub y: i32,
}

/// What happened during one [`TouchBus::publish`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Number of events in the batch.
    pub events: usize,
    /// Subscribers that received the whole batch.
    pub recipients: usize,
    /// Subscribers dropped because their queue was full.
    pub evicted: Vec<ConnectionId>,
}

struct Subscriber {
    tx: mpsc::Sender<Arc<str>>,
    evicted: CancellationToken,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<ConnectionId, Subscriber>,
    touches: HashMap<i32, ActiveTouch>,
    /// One past the highest `seq` published so far.
    next_seq: u64,
}

/// Fan-out hub between the device task and client connections.
pub struct TouchBus {
    registry: Mutex<Registry>,
    queue_capacity: usize,
}

impl TouchBus {
    /// Creates a bus whose subscribers each get `queue_capacity` slots
    /// (minimum 1).
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Registers a new subscriber.  It receives only events published after
    /// this call returns.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let evicted = CancellationToken::new();

        self.registry.lock().subscribers.insert(
            id,
            Subscriber {
                tx,
                evicted: evicted.clone(),
            },
        );
        debug!(conn_id = %id, "subscriber registered");

        Subscription {
            id,
            rx,
            evicted,
            bus: Arc::clone(self),
        }
    }

    /// Removes a subscriber.  Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        let removed = self.registry.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!(conn_id = %id, "subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Touches currently down, sorted by tracking id.
    pub fn active_touches(&self) -> Vec<ActiveTouch> {
        let mut touches: Vec<ActiveTouch> =
            self.registry.lock().touches.values().copied().collect();
        touches.sort_by_key(|t| t.id);
        touches
    }

    /// The `seq` the next published event should carry.
    ///
    /// A device pump seeds its tracker from this so numbering survives a
    /// device being reopened.
    pub fn next_seq(&self) -> u64 {
        self.registry.lock().next_seq
    }

    /// Delivers `events` to every current subscriber, in order.
    ///
    /// Never blocks: a subscriber whose queue cannot take the next payload is
    /// evicted on the spot.  A subscriber whose connection already went away
    /// is removed quietly.
    pub fn publish(&self, events: &[TouchEvent]) -> PublishReport {
        let mut report = PublishReport {
            events: events.len(),
            ..PublishReport::default()
        };
        if events.is_empty() {
            return report;
        }

        let payloads: Vec<Arc<str>> = events
            .iter()
            .filter_map(|ev| match WireMessage::from(ev).to_json() {
                Ok(json) => Some(Arc::from(json)),
                Err(e) => {
                    warn!(seq = ev.seq, error = %e, "failed to serialize touch event");
                    None
                }
            })
            .collect();

        let mut registry = self.registry.lock();

        for ev in events {
            registry.next_seq = registry.next_seq.max(ev.seq.saturating_add(1));
            match ev.kind {
                TouchKind::Start | TouchKind::Move => {
                    registry.touches.insert(
                        ev.id,
                        ActiveTouch {
                            id: ev.id,
                            x: ev.x,
                            y: ev.y,
                        },
                    );
                }
                TouchKind::End => {
                    registry.touches.remove(&ev.id);
                }
            }
        }

        let mut closed = Vec::new();
        for (id, sub) in &registry.subscribers {
            match deliver(&sub.tx, &payloads) {
                Ok(()) => report.recipients += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        conn_id = %id,
                        capacity = self.queue_capacity,
                        "subscriber queue full; dropping subscriber (backpressure)"
                    );
                    sub.evicted.cancel();
                    report.evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %id, "subscriber queue closed; removing");
                    closed.push(*id);
                }
            }
        }

        for id in report.evicted.iter().chain(closed.iter()) {
            registry.subscribers.remove(id);
        }

        debug!(
            events = report.events,
            recipients = report.recipients,
            evicted = report.evicted.len(),
            "published touch batch"
        );
        report
    }
}

impl Default for TouchBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn deliver(
    tx: &mpsc::Sender<Arc<str>>,
    payloads: &[Arc<str>],
) -> Result<(), TrySendError<Arc<str>>> {
    for payload in payloads {
        tx.try_send(Arc::clone(payload))?;
    }
    Ok(())
}

/// A registered subscriber's receiving end.
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: ConnectionId,
    rx: mpsc::Receiver<Arc<str>>,
    evicted: CancellationToken,
    bus: Arc<TouchBus>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Waits for the next payload.  `None` once the subscriber has been
    /// removed from the bus and its queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Takes a queued payload without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }

    /// Cancelled when the bus evicts this subscriber for backpressure.
    pub fn eviction_token(&self) -> CancellationToken {
        self.evicted.clone()
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("evicted", &self.is_evicted())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
