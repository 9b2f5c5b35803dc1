//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file. Defaults
//! come from the component constants so the file and the library agree.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::animation::{InterpolatorConfig, DEFAULT_STEP_DEGREES, DEFAULT_TICK};
use crate::fanout::{
    BroadcastConfig, ServerConfig, DEFAULT_BROADCAST_INTERVAL, DEFAULT_LIVENESS_INTERVAL,
    DEFAULT_LISTEN_PORT, DEFAULT_SUBSCRIBER_BUFFER, DEFAULT_WRITE_TIMEOUT,
};
use crate::feed::{
    FeedConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FEED_HOST, DEFAULT_FEED_PORT,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_RECONNECT_DELAY_SECS,
    DEFAULT_SUBSCRIPTION,
};
use crate::flight::{CacheConfig, DEFAULT_MAX_SNAPSHOT_AGE, DEFAULT_STALE_AFTER};
use crate::logging::{default_log_dir, default_log_file};
use crate::supervisor::{
    PipelineConfig, SnapshotConfig, DEFAULT_MAINTENANCE_INTERVAL, DEFAULT_PERSIST_INTERVAL,
};

use super::file::config_directory;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// Upstream feed settings
    pub feed: FeedSettings,
    /// Subscriber endpoint settings
    pub server: ServerSettings,
    /// Broadcast and liveness settings
    pub broadcast: BroadcastSettings,
    /// Position interpolation settings
    pub interpolation: InterpolationSettings,
    /// Flight cache and snapshot settings
    pub cache: CacheSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Upstream feed configuration.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// Extra PEM CA certificate
    pub ca_file: Option<PathBuf>,
    pub username: String,
    pub password: String,
    pub subscription: String,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_attempts: u32,
    pub read_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_FEED_HOST.to_string(),
            port: DEFAULT_FEED_PORT,
            tls: true,
            ca_file: None,
            username: String::new(),
            password: String::new(),
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Subscriber endpoint configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
        }
    }
}

/// Broadcast configuration.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub interval_ms: u64,
    pub liveness_interval_secs: u64,
    pub subscriber_buffer: usize,
    pub write_timeout_secs: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_BROADCAST_INTERVAL.as_millis() as u64,
            liveness_interval_secs: DEFAULT_LIVENESS_INTERVAL.as_secs(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
        }
    }
}

/// Interpolation configuration.
#[derive(Debug, Clone)]
pub struct InterpolationSettings {
    pub enabled: bool,
    pub tick_ms: u64,
    /// Degrees moved per tick
    pub step: f64,
    /// Maximum random offset per tick, degrees
    pub jitter: f64,
}

impl Default for InterpolationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: DEFAULT_TICK.as_millis() as u64,
            step: DEFAULT_STEP_DEGREES,
            jitter: 0.0,
        }
    }
}

/// Cache and snapshot configuration.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub stale_after_secs: u64,
    /// 0 drops identity updates for unknown aircraft
    pub orphan_grace_secs: u64,
    pub maintenance_interval_secs: u64,
    /// Snapshot file; `None` disables persistence
    pub snapshot_file: Option<PathBuf>,
    pub snapshot_interval_secs: u64,
    pub snapshot_max_age_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: DEFAULT_STALE_AFTER.as_secs(),
            orphan_grace_secs: 0,
            maintenance_interval_secs: DEFAULT_MAINTENANCE_INTERVAL.as_secs(),
            snapshot_file: Some(config_directory().join("snapshot.json")),
            snapshot_interval_secs: DEFAULT_PERSIST_INTERVAL.as_secs(),
            snapshot_max_age_secs: DEFAULT_MAX_SNAPSHOT_AGE.as_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(default_log_dir()),
            file: default_log_file().to_string(),
        }
    }
}

impl ConfigFile {
    /// Build the component configs the pipeline runs with.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let feed = &self.feed;
        let broadcast = &self.broadcast;
        let interpolation = &self.interpolation;
        let cache = &self.cache;

        PipelineConfig {
            feed: FeedConfig {
                host: feed.host.clone(),
                port: feed.port,
                tls: feed.tls,
                ca_file: feed.ca_file.clone(),
                username: feed.username.clone(),
                password: feed.password.clone(),
                subscription: feed.subscription.clone(),
                reconnect_delay: Duration::from_secs(feed.reconnect_delay_secs),
                max_reconnect_attempts: feed.max_reconnect_attempts,
                read_timeout: Duration::from_secs(feed.read_timeout_secs),
                connect_timeout: Duration::from_secs(feed.connect_timeout_secs),
            },
            cache: CacheConfig {
                stale_after: Duration::from_secs(cache.stale_after_secs),
                orphan_grace: Duration::from_secs(cache.orphan_grace_secs),
            },
            interpolation: InterpolatorConfig {
                enabled: interpolation.enabled,
                tick: Duration::from_millis(interpolation.tick_ms),
                step: interpolation.step,
                jitter: interpolation.jitter,
            },
            broadcast: BroadcastConfig {
                interval: Duration::from_millis(broadcast.interval_ms),
                liveness_interval: Duration::from_secs(broadcast.liveness_interval_secs),
                subscriber_buffer: broadcast.subscriber_buffer,
                write_timeout: Duration::from_secs(broadcast.write_timeout_secs),
            },
            server: ServerConfig {
                listen: self.server.listen,
            },
            snapshot: SnapshotConfig {
                path: cache.snapshot_file.clone(),
                persist_interval: Duration::from_secs(cache.snapshot_interval_secs),
                max_age: Duration::from_secs(cache.snapshot_max_age_secs),
            },
            maintenance_interval: Duration::from_secs(cache.maintenance_interval_secs),
        }
    }
}
