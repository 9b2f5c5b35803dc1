//! Subscriber registry - routes frames from the broadcaster to connections.
//!
//! ```text
//!                     Arc<SubscriberRegistry>
//!               ┌──────────────────────────────────┐
//!               │ subscribers: DashMap<Id, Entry { │
//!               │     filter,                      │
//!               │     tx: mpsc::Sender<Outbound>,  │
//!               │     awaiting_probe,              │
//!               │     cancellation (child token),  │
//!               │ }>                               │
//!               └────────────────┬─────────────────┘
//!                                │ try_send
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!      [writer task]       [writer task]       [writer task]
//!            │                   │                   │
//!         WebSocket           WebSocket           WebSocket
//! ```
//!
//! Frames are `Arc<str>`: subscribers sharing a filter share one serialised
//! payload. Pushes never block; a full queue drops that push for that
//! subscriber only, and a closed queue unregisters it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::filter::FlightFilter;
use super::message::{EventEnvelope, ServerMessage};
use crate::flight::FlightRecord;

/// Identifies one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Item queued for a subscriber's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialised JSON text frame.
    Frame(Arc<str>),
    /// Transport-level liveness probe.
    Probe,
}

/// Handle returned from [`SubscriberRegistry::register`].
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// Cancelled when the subscriber is unregistered or the registry shuts down.
    pub cancellation: CancellationToken,
}

/// Result of one push to all subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    pub delivered: usize,
    /// Pushes skipped because a subscriber's queue was full.
    pub dropped: usize,
    /// Subscribers unregistered because their queue was closed.
    pub removed: usize,
}

/// Result of one liveness pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    pub probed: usize,
    pub evicted: usize,
}

struct SubscriberEntry {
    filter: FlightFilter,
    tx: mpsc::Sender<Outbound>,
    awaiting_probe: bool,
    cancellation: CancellationToken,
}

/// Registry of connected subscribers.
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriptionId, SubscriberEntry>,
    next_id: AtomicU64,
    cancellation: CancellationToken,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl SubscriberRegistry {
    /// Create a registry whose subscriber tokens are children of `cancellation`.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            cancellation,
        }
    }

    /// Register a subscriber fed through `tx`, with the `all` filter.
    pub fn register(&self, tx: mpsc::Sender<Outbound>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancellation = self.cancellation.child_token();
        self.subscribers.insert(
            id,
            SubscriberEntry {
                filter: FlightFilter::default(),
                tx,
                awaiting_probe: false,
                cancellation: cancellation.clone(),
            },
        );
        tracing::info!(subscriber = %id, total = self.subscribers.len(), "Subscriber registered");
        Subscription { id, cancellation }
    }

    /// Change a subscriber's filter. Returns false for unknown ids.
    pub fn set_filter(&self, id: SubscriptionId, filter: FlightFilter) -> bool {
        match self.subscribers.get_mut(&id) {
            Some(mut entry) => {
                entry.filter = filter;
                tracing::debug!(subscriber = %id, filter = %filter, "Subscriber filter changed");
                true
            }
            None => false,
        }
    }

    /// Current filter of a subscriber.
    pub fn filter(&self, id: SubscriptionId) -> Option<FlightFilter> {
        self.subscribers.get(&id).map(|entry| entry.filter)
    }

    /// Remove a subscriber and cancel its tasks. Returns false if already gone.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        match self.subscribers.remove(&id) {
            Some((_, entry)) => {
                entry.cancellation.cancel();
                tracing::info!(
                    subscriber = %id,
                    total = self.subscribers.len(),
                    "Subscriber unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Record inbound traffic from a subscriber, answering any pending probe.
    pub fn mark_alive(&self, id: SubscriptionId) {
        if let Some(mut entry) = self.subscribers.get_mut(&id) {
            entry.awaiting_probe = false;
        }
    }

    /// Queue one item for one subscriber.
    ///
    /// Returns false when the subscriber is unknown, its queue is full, or it
    /// was removed because its queue is closed.
    pub fn send(&self, id: SubscriptionId, item: Outbound) -> bool {
        let result = match self.subscribers.get(&id) {
            Some(entry) => entry.tx.try_send(item),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(subscriber = %id, "Subscriber queue full, dropping push");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister(id);
                false
            }
        }
    }

    /// Push the flights matching each subscriber's filter.
    ///
    /// Each distinct filter in use is evaluated and serialised once.
    pub fn broadcast(&self, flights: &[FlightRecord]) -> PushStats {
        let mut frames: HashMap<FlightFilter, Arc<str>> = HashMap::new();
        for entry in self.subscribers.iter() {
            let filter = entry.filter;
            if frames.contains_key(&filter) {
                continue;
            }
            match ServerMessage::flights(filter.apply(flights)).to_json() {
                Ok(json) => {
                    frames.insert(filter, Arc::from(json));
                }
                Err(e) => {
                    tracing::warn!(filter = %filter, error = %e, "Failed to serialise flights");
                }
            }
        }

        self.push_each(|entry| frames.get(&entry.filter).cloned())
    }

    /// Push a named event envelope to every subscriber regardless of filter.
    pub fn publish_event<T: Serialize>(
        &self,
        kind: &str,
        data: &T,
    ) -> Result<PushStats, serde_json::Error> {
        let frame: Arc<str> = Arc::from(EventEnvelope::new(kind, data).to_json()?);
        Ok(self.push_each(|_| Some(Arc::clone(&frame))))
    }

    /// Evict subscribers that ignored the previous probe and probe the rest.
    pub fn probe(&self) -> ProbeStats {
        let mut stats = ProbeStats::default();
        let mut dead = Vec::new();

        for mut entry in self.subscribers.iter_mut() {
            if entry.awaiting_probe {
                dead.push(*entry.key());
                continue;
            }
            match entry.tx.try_send(Outbound::Probe) {
                Ok(()) | Err(TrySendError::Full(_)) => {
                    entry.awaiting_probe = true;
                    stats.probed += 1;
                }
                Err(TrySendError::Closed(_)) => dead.push(*entry.key()),
            }
        }

        for id in dead {
            if self.unregister(id) {
                tracing::debug!(subscriber = %id, "Subscriber failed liveness check");
                stats.evicted += 1;
            }
        }
        stats
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Unregister every subscriber.
    pub fn clear(&self) {
        let ids: Vec<SubscriptionId> = self.subscribers.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.unregister(id);
        }
    }

    fn push_each<F>(&self, mut frame_for: F) -> PushStats
    where
        F: FnMut(&SubscriberEntry) -> Option<Arc<str>>,
    {
        let mut stats = PushStats::default();
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            let Some(frame) = frame_for(entry.value()) else {
                continue;
            };
            match entry.tx.try_send(Outbound::Frame(frame)) {
                Ok(()) => stats.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = %entry.key(), "Subscriber queue full, dropping push");
                    stats.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        for id in closed {
            if self.unregister(id) {
                stats.removed += 1;
            }
        }
        stats
    }
}
