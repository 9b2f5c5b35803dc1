//! Animation interpolator - keeps positions moving between real reports.
//!
//! Upstream reports arrive every few seconds per aircraft. To make map
//! markers glide instead of jump, every tick nudges each cached position a
//! small distance along its heading:
//!
//! ```text
//! lat' = lat + sin(heading) * k
//! lon' = lon + cos(heading) * k
//! ```
//!
//! `k` is a fixed step in degrees (not scaled by ground speed). The result is
//! cosmetic; the next real report replaces it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::flight::{FlightCache, Position};

/// Default interpolation tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(250);

/// Default step per tick, in degrees.
pub const DEFAULT_STEP_DEGREES: f64 = 0.0001;

/// Interpolator settings.
#[derive(Debug, Clone)]
pub struct InterpolatorConfig {
    pub enabled: bool,
    pub tick: Duration,
    /// Displacement per tick along the heading, in degrees.
    pub step: f64,
    /// Maximum uniform jitter added to each axis, in degrees. Zero disables.
    pub jitter: f64,
}

impl Default for InterpolatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick: DEFAULT_TICK,
            step: DEFAULT_STEP_DEGREES,
            jitter: 0.0,
        }
    }
}

/// Advance one position by one step along its heading.
///
/// Latitude is clamped to [-90, 90]; longitude is wrapped into [-180, 180].
/// Everything except the coordinates and timestamp is carried over.
pub fn dead_reckon(
    position: &Position,
    step: f64,
    jitter: (f64, f64),
    now: DateTime<Utc>,
) -> Position {
    let heading = position.heading_deg.to_radians();
    let latitude = (position.latitude + heading.sin() * step + jitter.0).clamp(-90.0, 90.0);
    let longitude = wrap_longitude(position.longitude + heading.cos() * step + jitter.1);

    Position {
        latitude,
        longitude,
        timestamp: now,
        ..position.clone()
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Periodically dead-reckons every record in the cache.
pub struct Interpolator {
    cache: Arc<FlightCache>,
    config: InterpolatorConfig,
}

impl Interpolator {
    pub fn new(cache: Arc<FlightCache>, config: InterpolatorConfig) -> Self {
        Self { cache, config }
    }

    /// Apply one interpolation step to all records. Returns records moved.
    pub fn tick(&self) -> usize {
        let now = Utc::now();
        let step = self.config.step;
        let jitter = self.config.jitter;
        let mut rng = rand::rng();

        self.cache.update_positions(|position| {
            let offset = if jitter > 0.0 {
                (
                    rng.random_range(-jitter..=jitter),
                    rng.random_range(-jitter..=jitter),
                )
            } else {
                (0.0, 0.0)
            };
            dead_reckon(position, step, offset, now)
        })
    }

    /// Tick until cancelled. Returns immediately when disabled.
    pub async fn run(self, cancellation: CancellationToken) {
        if !self.config.enabled {
            tracing::info!("Position interpolation disabled");
            return;
        }

        tracing::info!(
            tick_ms = self.config.tick.as_millis() as u64,
            step = self.config.step,
            "Position interpolator started"
        );

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("Position interpolator cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let moved = self.tick();
                    tracing::trace!(moved, "Interpolation tick");
                }
            }
        }
    }
}
