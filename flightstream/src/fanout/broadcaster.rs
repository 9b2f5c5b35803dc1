//! Broadcaster - periodic snapshot pushes and subscriber liveness.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::filter::FlightFilter;
use super::message::ServerMessage;
use super::registry::{Outbound, SubscriberRegistry, Subscription};
use crate::flight::FlightCache;

/// Default interval between snapshot pushes.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between liveness passes.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// Default bound on a single transport write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Broadcast and liveness settings.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub interval: Duration,
    pub liveness_interval: Duration,
    /// Frames queued per subscriber before pushes are dropped.
    pub subscriber_buffer: usize,
    pub write_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_BROADCAST_INTERVAL,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Pushes cache snapshots to the registry's subscribers.
#[derive(Clone)]
pub struct Broadcaster {
    cache: Arc<FlightCache>,
    registry: Arc<SubscriberRegistry>,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(
        cache: Arc<FlightCache>,
        registry: Arc<SubscriberRegistry>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            cache,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Register a subscriber and, if the cache holds any flights, queue an
    /// immediate snapshot for it.
    pub fn register_subscriber(&self, tx: mpsc::Sender<Outbound>) -> Subscription {
        let subscription = self.registry.register(tx);

        if !self.cache.is_empty() {
            let flights = self.cache.snapshot();
            match ServerMessage::flights(FlightFilter::default().apply(&flights)).to_json() {
                Ok(json) => {
                    self.registry
                        .send(subscription.id, Outbound::Frame(Arc::from(json)));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialise initial snapshot");
                }
            }
        }

        subscription
    }

    /// Push one snapshot to every subscriber.
    pub fn broadcast_once(&self) {
        if self.registry.is_empty() {
            return;
        }
        let flights = self.cache.snapshot();
        let stats = self.registry.broadcast(&flights);
        tracing::trace!(
            flights = flights.len(),
            delivered = stats.delivered,
            dropped = stats.dropped,
            removed = stats.removed,
            "Broadcast tick"
        );
    }

    /// Broadcast every interval until cancelled.
    pub async fn run_broadcast(self, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("Broadcaster cancelled");
                    break;
                }
                _ = ticker.tick() => self.broadcast_once(),
            }
        }
    }

    /// Probe subscribers every liveness interval until cancelled.
    pub async fn run_liveness(self, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.liveness_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so new subscribers get
        // a full interval before their first probe.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("Liveness checker cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let stats = self.registry.probe();
                    if stats.evicted > 0 {
                        tracing::info!(
                            evicted = stats.evicted,
                            remaining = self.registry.len(),
                            "Evicted unresponsive subscribers"
                        );
                    }
                }
            }
        }
    }
}
