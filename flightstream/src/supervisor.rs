//! Pipeline supervisor - starts, owns and stops every pipeline task.
//!
//! # Startup Sequence
//!
//! 1. The cache is created and seeded from the snapshot source, if any
//! 2. The subscriber endpoint binds its listen socket
//! 3. Long-running tasks are spawned: ingestion, interpolation, broadcast,
//!    liveness, maintenance, snapshot persistence and the accept loop
//!
//! All tasks observe one [`CancellationToken`]; [`LivePipeline::shutdown`]
//! cancels it and waits for every task to finish.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = LivePipeline::builder(config)
//!     .snapshot_store(Arc::new(JsonSnapshotStore::new(path)))
//!     .start()
//!     .await?;
//!
//! println!("Serving subscribers on {}", pipeline.local_addr());
//! tokio::signal::ctrl_c().await?;
//! pipeline.shutdown().await;
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::animation::{Interpolator, InterpolatorConfig};
use crate::fanout::{
    BroadcastConfig, Broadcaster, ServerConfig, ServerError, SubscriberRegistry, SubscriberServer,
};
use crate::feed::{FeedConfig, FeedConnector, FeedError, FeedState, IngestionClient, TcpConnector};
use crate::flight::{CacheConfig, FlightCache, JsonSnapshotStore, SnapshotSink, SnapshotSource};

/// Default interval between snapshot writes.
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between stale-record sweeps.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Snapshot persistence settings.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Snapshot file used when no store is supplied; `None` disables
    /// persistence and seeding.
    pub path: Option<PathBuf>,
    pub persist_interval: Duration,
    /// Snapshots older than this are not used for seeding.
    pub max_age: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            persist_interval: DEFAULT_PERSIST_INTERVAL,
            max_age: crate::flight::DEFAULT_MAX_SNAPSHOT_AGE,
        }
    }
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feed: FeedConfig,
    pub cache: CacheConfig,
    pub interpolation: InterpolatorConfig,
    pub broadcast: BroadcastConfig,
    pub server: ServerConfig,
    pub snapshot: SnapshotConfig,
    pub maintenance_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            cache: CacheConfig::default(),
            interpolation: InterpolatorConfig::default(),
            broadcast: BroadcastConfig::default(),
            server: ServerConfig::default(),
            snapshot: SnapshotConfig::default(),
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

/// Errors that prevent the pipeline from starting.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Feed setup failed: {0}")]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Builder for [`LivePipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    connector: Option<Arc<dyn FeedConnector>>,
    sink: Option<Arc<dyn SnapshotSink>>,
    source: Option<Arc<dyn SnapshotSource>>,
}

impl PipelineBuilder {
    /// Use a custom feed connector instead of TCP/TLS from the feed config.
    pub fn connector(mut self, connector: Arc<dyn FeedConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn snapshot_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Use one store as both sink and source.
    pub fn snapshot_store<S>(self, store: Arc<S>) -> Self
    where
        S: SnapshotSink + SnapshotSource + 'static,
    {
        let sink: Arc<dyn SnapshotSink> = store.clone();
        self.snapshot_sink(sink).snapshot_source(store)
    }

    /// Seed the cache, bind the endpoint and spawn every task.
    ///
    /// Without an explicit sink or source, a configured snapshot path is
    /// used as a [`JsonSnapshotStore`] for both.
    pub async fn start(self) -> Result<LivePipeline, PipelineError> {
        let PipelineBuilder {
            config,
            connector,
            sink,
            source,
        } = self;

        let (sink, source) = match (sink, source, &config.snapshot.path) {
            (None, None, Some(path)) => {
                let store = Arc::new(
                    JsonSnapshotStore::new(path).with_max_age(config.snapshot.max_age),
                );
                let sink: Arc<dyn SnapshotSink> = store.clone();
                let source: Arc<dyn SnapshotSource> = store;
                (Some(sink), Some(source))
            }
            (sink, source, _) => (sink, source),
        };

        let connector = match connector {
            Some(connector) => connector,
            None => Arc::new(TcpConnector::from_config(&config.feed)?),
        };

        let cancellation = CancellationToken::new();
        let cache = Arc::new(FlightCache::new(config.cache.clone()));

        if let Some(source) = source {
            seed_cache(&cache, source).await;
        }

        let registry = Arc::new(SubscriberRegistry::new(cancellation.clone()));
        let broadcaster = Broadcaster::new(
            Arc::clone(&cache),
            Arc::clone(&registry),
            config.broadcast.clone(),
        );
        let server = SubscriberServer::bind(&config.server, broadcaster.clone()).await?;
        let local_addr = server.local_addr()?;

        let client = IngestionClient::new(config.feed.clone(), connector, Arc::clone(&cache));
        let feed_state = client.state();

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let feed_cancel = cancellation.clone();
        tasks.push((
            "ingestion",
            tokio::spawn(async move {
                // Terminal failures are logged by the client; cached data stays served.
                let _ = client.run(feed_cancel).await;
            }),
        ));

        let interpolator = Interpolator::new(Arc::clone(&cache), config.interpolation.clone());
        tasks.push((
            "interpolator",
            tokio::spawn(interpolator.run(cancellation.clone())),
        ));

        tasks.push((
            "broadcast",
            tokio::spawn(broadcaster.clone().run_broadcast(cancellation.clone())),
        ));
        tasks.push((
            "liveness",
            tokio::spawn(broadcaster.run_liveness(cancellation.clone())),
        ));

        tasks.push((
            "maintenance",
            tokio::spawn(run_maintenance(
                Arc::clone(&cache),
                config.maintenance_interval,
                cancellation.clone(),
            )),
        ));

        if let Some(sink) = sink {
            tasks.push((
                "persistence",
                tokio::spawn(run_persistence(
                    Arc::clone(&cache),
                    sink,
                    config.snapshot.persist_interval,
                    cancellation.clone(),
                )),
            ));
        }

        tasks.push(("server", tokio::spawn(server.run(cancellation.clone()))));

        info!(
            subscribers = %local_addr,
            tasks = tasks.len(),
            seeded = cache.len(),
            "Live pipeline started"
        );

        Ok(LivePipeline {
            cache,
            registry,
            feed_state,
            local_addr,
            cancellation,
            tasks,
        })
    }
}

/// A running pipeline.
pub struct LivePipeline {
    cache: Arc<FlightCache>,
    registry: Arc<SubscriberRegistry>,
    feed_state: watch::Receiver<FeedState>,
    local_addr: SocketAddr,
    cancellation: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl LivePipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            connector: None,
            sink: None,
            source: None,
        }
    }

    /// Shared flight cache (snapshot API for the surrounding system).
    pub fn cache(&self) -> &Arc<FlightCache> {
        &self.cache
    }

    /// Subscriber registry, for publishing events.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Watch the upstream connection state.
    pub fn feed_state(&self) -> watch::Receiver<FeedState> {
        self.feed_state.clone()
    }

    /// Address the subscriber endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token cancelled on shutdown.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(self) {
        info!("Shutting down live pipeline");
        self.cancellation.cancel();

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => debug!(task = name, "Task stopped"),
                Err(e) => warn!(task = name, error = %e, "Task ended abnormally"),
            }
        }

        info!("Live pipeline shutdown complete");
    }
}

async fn seed_cache(cache: &FlightCache, source: Arc<dyn SnapshotSource>) {
    match tokio::task::spawn_blocking(move || source.load_snapshot()).await {
        Ok(Ok(Some(flights))) => {
            let seeded = cache.seed(flights);
            info!(seeded, "Seeded flight cache from snapshot");
        }
        Ok(Ok(None)) => debug!("No usable snapshot to seed from"),
        Ok(Err(e)) => warn!(error = %e, "Failed to load snapshot, starting empty"),
        Err(e) => warn!(error = %e, "Snapshot load task failed, starting empty"),
    }
}

async fn run_maintenance(cache: Arc<FlightCache>, interval: Duration, cancellation: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = ticker.tick() => {
                cache.evict_stale();
            }
        }
    }
}

/// Write a snapshot whenever real updates arrived since the last write, and
/// once more on shutdown.
async fn run_persistence(
    cache: Arc<FlightCache>,
    sink: Arc<dyn SnapshotSink>,
    interval: Duration,
    cancellation: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    // Seeded data came from the snapshot; nothing new to write yet.
    let mut persisted = cache.generation();

    loop {
        let stopping = tokio::select! {
            _ = cancellation.cancelled() => true,
            _ = ticker.tick() => false,
        };

        let generation = cache.generation();
        if generation != persisted {
            let flights = cache.snapshot();
            let count = flights.len();
            let sink = Arc::clone(&sink);
            match tokio::task::spawn_blocking(move || sink.persist_snapshot(&flights)).await {
                Ok(Ok(())) => {
                    persisted = generation;
                    debug!(flights = count, "Snapshot persisted");
                }
                Ok(Err(e)) => warn!(error = %e, "Failed to persist snapshot"),
                Err(e) => warn!(error = %e, "Snapshot persist task failed"),
            }
        }

        if stopping {
            break;
        }
    }
}
