//! Flight State Cache - the single source of truth for live flight state.
//!
//! The cache maps aircraft id to [`FlightRecord`] and is shared (via `Arc`)
//! between the ingestion client, the interpolator and the broadcaster. All
//! synchronisation lives inside the cache: records are stored in a sharded
//! [`DashMap`], so every operation is a short per-record critical section and
//! a writer never waits on a reader of an unrelated shard.
//!
//! # Merge rules
//!
//! - Position reports replace `position` (and `squawk` when present).
//! - Identity reports set `callsign`/`flight_number` unconditionally, set route
//!   endpoints only when present, and never erase anything.
//! - An identity report for an unknown id is dropped, or buffered for a short
//!   grace window when [`CacheConfig::orphan_grace`] is non-zero.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::model::{FlightRecord, Position, RouteEndpoint};
use super::update::{IdentityUpdate, PositionUpdate};

/// Default age after which a record without real updates is evicted.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Configuration for the flight cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Records with no real update for this long are evicted.
    pub stale_after: Duration,

    /// How long an identity update for an unknown id is held waiting for its
    /// first position. Zero drops orphans immediately.
    pub orphan_grace: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            orphan_grace: Duration::ZERO,
        }
    }
}

/// What `apply_position` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOutcome {
    Created,
    Updated,
}

/// What `apply_identity` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOutcome {
    Applied,
    /// No record for the id; the update was discarded.
    Dropped,
    /// No record for the id yet; held for the orphan grace window.
    Buffered,
}

/// A record plus bookkeeping that is never sent to subscribers.
#[derive(Debug, Clone)]
struct CachedFlight {
    record: FlightRecord,
    last_real_update: Instant,
    last_real_timestamp: DateTime<Utc>,
}

impl CachedFlight {
    fn new(record: FlightRecord) -> Self {
        let last_real_timestamp = record.position.timestamp;
        Self {
            record,
            last_real_update: Instant::now(),
            last_real_timestamp,
        }
    }
}

/// Live flight state keyed by aircraft id.
pub struct FlightCache {
    flights: DashMap<String, CachedFlight>,
    orphans: Mutex<HashMap<String, (IdentityUpdate, Instant)>>,
    generation: AtomicU64,
    config: CacheConfig,
}

impl std::fmt::Debug for FlightCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightCache")
            .field("flights", &self.flights.len())
            .field("generation", &self.generation())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for FlightCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl FlightCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            flights: DashMap::new(),
            orphans: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            config,
        }
    }

    /// Apply a real position report.
    ///
    /// Creates the record on first sighting; otherwise replaces only the
    /// position (and squawk, when the report carries one).
    pub fn apply_position(&self, update: PositionUpdate) -> PositionOutcome {
        let outcome = match self.flights.get_mut(&update.id) {
            Some(mut entry) => {
                let flight = entry.value_mut();
                // Real timestamps never go backwards for one aircraft.
                let timestamp = update.timestamp.max(flight.last_real_timestamp);
                flight.record.position = update.to_position(timestamp);
                if let Some(squawk) = update.squawk {
                    flight.record.squawk = Some(squawk);
                }
                flight.last_real_update = Instant::now();
                flight.last_real_timestamp = timestamp;
                PositionOutcome::Updated
            }
            None => {
                let mut record =
                    FlightRecord::first_sighting(&update.id, update.to_position(update.timestamp));
                record.squawk = update.squawk.clone();
                self.flights
                    .entry(update.id.clone())
                    .or_insert_with(|| CachedFlight::new(record));
                PositionOutcome::Created
            }
        };

        self.generation.fetch_add(1, Ordering::Relaxed);

        if outcome == PositionOutcome::Created {
            if let Some(identity) = self.take_orphan(&update.id) {
                tracing::debug!(id = %update.id, "Applying buffered identity update");
                self.apply_identity(identity);
            }
        }

        outcome
    }

    /// Apply an identity/route report.
    pub fn apply_identity(&self, update: IdentityUpdate) -> IdentityOutcome {
        let Some(mut entry) = self.flights.get_mut(&update.id) else {
            return self.handle_orphan(update);
        };

        let record = &mut entry.value_mut().record;
        record.callsign = Some(update.callsign.clone());
        record.flight_number = Some(update.callsign);
        if let Some(origin) = update.origin {
            record
                .departure
                .get_or_insert_with(RouteEndpoint::default)
                .icao = Some(origin);
        }
        if let Some(destination) = update.destination {
            record
                .arrival
                .get_or_insert_with(RouteEndpoint::default)
                .icao = Some(destination);
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        drop(entry);

        self.generation.fetch_add(1, Ordering::Relaxed);
        IdentityOutcome::Applied
    }

    /// Copy of all current records, ordered by id.
    pub fn snapshot(&self) -> Vec<FlightRecord> {
        let mut records: Vec<FlightRecord> = self
            .flights
            .iter()
            .map(|entry| entry.value().record.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Look up one record.
    pub fn get(&self, id: &str) -> Option<FlightRecord> {
        self.flights.get(id).map(|entry| entry.value().record.clone())
    }

    /// Number of tracked aircraft.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// True when no aircraft are tracked.
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Counter bumped on every applied real update.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Rewrite every position in place.
    ///
    /// `step` receives the current position and returns its replacement. Each
    /// record is read and written under its entry lock, so the new position is
    /// always derived from the latest applied one. Real-update bookkeeping is
    /// left untouched. Returns the number of records visited.
    pub fn update_positions<F>(&self, mut step: F) -> usize
    where
        F: FnMut(&Position) -> Position,
    {
        let mut visited = 0;
        for mut entry in self.flights.iter_mut() {
            let position = &mut entry.value_mut().record.position;
            *position = step(position);
            visited += 1;
        }
        visited
    }

    /// Insert last-known-good records, keeping any record already present.
    ///
    /// Returns the number of records inserted.
    pub fn seed(&self, records: Vec<FlightRecord>) -> usize {
        let mut inserted = 0;
        for record in records {
            let id = record.id.clone();
            self.flights.entry(id).or_insert_with(|| {
                inserted += 1;
                CachedFlight::new(record)
            });
        }
        inserted
    }

    /// Evict records with no real update for `stale_after`, and expired
    /// orphan identities. Returns the number of records evicted.
    pub fn evict_stale(&self) -> usize {
        let max_age = self.config.stale_after;
        let before = self.flights.len();
        self.flights
            .retain(|_, flight| flight.last_real_update.elapsed() <= max_age);
        let evicted = before.saturating_sub(self.flights.len());

        let grace = self.config.orphan_grace;
        self.orphans
            .lock()
            .retain(|_, (_, received)| received.elapsed() <= grace);

        if evicted > 0 {
            tracing::info!(evicted, remaining = self.flights.len(), "Evicted stale flights");
        }
        evicted
    }

    /// Number of identity updates waiting for a first position.
    pub fn orphan_count(&self) -> usize {
        self.orphans.lock().len()
    }

    fn handle_orphan(&self, update: IdentityUpdate) -> IdentityOutcome {
        if self.config.orphan_grace.is_zero() {
            tracing::trace!(id = %update.id, "Dropping identity update for unknown aircraft");
            return IdentityOutcome::Dropped;
        }

        tracing::trace!(id = %update.id, "Buffering identity update for unknown aircraft");
        self.orphans
            .lock()
            .insert(update.id.clone(), (update, Instant::now()));
        IdentityOutcome::Buffered
    }

    fn take_orphan(&self, id: &str) -> Option<IdentityUpdate> {
        if self.config.orphan_grace.is_zero() {
            return None;
        }
        let (update, received) = self.orphans.lock().remove(id)?;
        (received.elapsed() <= self.config.orphan_grace).then_some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::{FlightStatus, UNKNOWN_AIRLINE};

    fn pos(id: &str, lat: f64, lon: f64, epoch: i64) -> PositionUpdate {
        PositionUpdate {
            id: id.to_string(),
            latitude: lat,
            longitude: lon,
            altitude_ft: 10000.0,
            heading_deg: 90.0,
            ground_speed_kt: 250.0,
            update_type: "A".to_string(),
            timestamp: DateTime::from_timestamp(epoch, 0).unwrap(),
            squawk: None,
        }
    }

    fn ident(id: &str, callsign: &str, origin: Option<&str>, dest: Option<&str>) -> IdentityUpdate {
        IdentityUpdate {
            id: id.to_string(),
            callsign: callsign.to_string(),
            origin: origin.map(String::from),
            destination: dest.map(String::from),
            status: None,
        }
    }

    #[test]
    fn test_first_position_creates_record_with_defaults() {
        let cache = FlightCache::default();

        assert_eq!(cache.apply_position(pos("X", 40.0, -73.0, 100)), PositionOutcome::Created);

        let record = cache.get("X").expect("record created");
        assert_eq!(record.callsign.as_deref(), Some("X"));
        assert_eq!(record.airline_name(), Some(UNKNOWN_AIRLINE));
        assert_eq!(record.status, FlightStatus::Active);
        assert_eq!(record.position.latitude, 40.0);
    }

    #[test]
    fn test_sticky_identity_survives_position_updates() {
        let cache = FlightCache::default();

        cache.apply_position(pos("X", 40.0, -73.0, 100));
        assert_eq!(
            cache.apply_identity(ident("X", "ABC123", None, None)),
            IdentityOutcome::Applied
        );
        assert_eq!(cache.apply_position(pos("X", 40.1, -73.1, 101)), PositionOutcome::Updated);

        let record = cache.get("X").unwrap();
        assert_eq!(record.callsign.as_deref(), Some("ABC123"));
        assert_eq!(record.flight_number.as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_route_fields_never_erased() {
        let cache = FlightCache::default();

        cache.apply_position(pos("X", 40.0, -73.0, 100));
        cache.apply_identity(ident("X", "DAL1", Some("KJFK"), Some("KLAX")));
        cache.apply_identity(ident("X", "DAL1", None, None));

        let record = cache.get("X").unwrap();
        assert_eq!(record.departure.unwrap().icao.as_deref(), Some("KJFK"));
        assert_eq!(record.arrival.unwrap().icao.as_deref(), Some("KLAX"));
    }

    #[test]
    fn test_route_update_keeps_other_endpoint_fields() {
        let cache = FlightCache::default();
        cache.apply_position(pos("X", 40.0, -73.0, 100));
        cache.apply_identity(ident("X", "DAL1", Some("KJFK"), None));
        cache.apply_identity(ident("X", "DAL1", Some("KEWR"), Some("KBOS")));

        let record = cache.get("X").unwrap();
        assert_eq!(record.departure.unwrap().icao.as_deref(), Some("KEWR"));
        assert_eq!(record.arrival.unwrap().icao.as_deref(), Some("KBOS"));
    }

    #[test]
    fn test_position_fully_replaced() {
        let cache = FlightCache::default();

        cache.apply_position(pos("X", 40.0, -73.0, 100));
        let mut second = pos("X", 41.0, -74.0, 200);
        second.altitude_ft = 0.0;
        second.heading_deg = 180.0;
        second.ground_speed_kt = 12.0;
        cache.apply_position(second.clone());

        let record = cache.get("X").unwrap();
        assert_eq!(record.position, second.to_position(second.timestamp));
    }

    #[test]
    fn test_squawk_replaced_only_when_present() {
        let cache = FlightCache::default();

        let mut first = pos("X", 40.0, -73.0, 100);
        first.squawk = Some("1200".to_string());
        cache.apply_position(first);
        cache.apply_position(pos("X", 40.0, -73.0, 101));
        assert_eq!(cache.get("X").unwrap().squawk.as_deref(), Some("1200"));

        let mut third = pos("X", 40.0, -73.0, 102);
        third.squawk = Some("7700".to_string());
        cache.apply_position(third);
        assert_eq!(cache.get("X").unwrap().squawk.as_deref(), Some("7700"));
    }

    #[test]
    fn test_real_timestamp_never_goes_backwards() {
        let cache = FlightCache::default();

        cache.apply_position(pos("X", 40.0, -73.0, 200));
        cache.apply_position(pos("X", 41.0, -73.0, 150));

        let record = cache.get("X").unwrap();
        assert_eq!(record.position.latitude, 41.0);
        assert_eq!(record.position.timestamp.timestamp(), 200);
    }

    #[test]
    fn test_real_update_wins_over_interpolated_timestamp() {
        let cache = FlightCache::default();
        cache.apply_position(pos("X", 40.0, -73.0, 100));

        cache.update_positions(|p| Position {
            latitude: p.latitude + 1.0,
            timestamp: DateTime::from_timestamp(10_000, 0).unwrap(),
            ..p.clone()
        });
        cache.apply_position(pos("X", 40.5, -73.0, 101));

        let record = cache.get("X").unwrap();
        assert_eq!(record.position.latitude, 40.5);
        assert_eq!(record.position.timestamp.timestamp(), 101);
    }

    #[test]
    fn test_orphan_identity_dropped_by_default() {
        let cache = FlightCache::default();

        assert_eq!(
            cache.apply_identity(ident("Y", "UAL9", Some("KSFO"), None)),
            IdentityOutcome::Dropped
        );
        assert!(cache.get("Y").is_none());

        cache.apply_position(pos("Y", 37.0, -122.0, 100));
        assert_eq!(cache.get("Y").unwrap().callsign.as_deref(), Some("Y"));
    }

    #[test]
    fn test_orphan_identity_buffered_within_grace() {
        let cache = FlightCache::new(CacheConfig {
            orphan_grace: Duration::from_secs(30),
            ..Default::default()
        });

        assert_eq!(
            cache.apply_identity(ident("Y", "UAL9", Some("KSFO"), None)),
            IdentityOutcome::Buffered
        );
        assert_eq!(cache.orphan_count(), 1);
        assert!(cache.is_empty());

        cache.apply_position(pos("Y", 37.0, -122.0, 100));
        let record = cache.get("Y").unwrap();
        assert_eq!(record.callsign.as_deref(), Some("UAL9"));
        assert_eq!(record.departure.unwrap().icao.as_deref(), Some("KSFO"));
        assert_eq!(cache.orphan_count(), 0);
    }

    #[test]
    fn test_identity_status_is_sticky_unless_changed() {
        let cache = FlightCache::default();
        cache.apply_position(pos("X", 40.0, -73.0, 100));

        let mut delayed = ident("X", "DAL1", None, None);
        delayed.status = Some(FlightStatus::Delayed);
        cache.apply_identity(delayed);
        cache.apply_identity(ident("X", "DAL1", None, None));
        cache.apply_position(pos("X", 40.0, -73.0, 101));

        assert_eq!(cache.get("X").unwrap().status, FlightStatus::Delayed);
    }

    #[test]
    fn test_snapshot_is_independent_and_ordered() {
        let cache = FlightCache::default();
        cache.apply_position(pos("C", 1.0, 1.0, 100));
        cache.apply_position(pos("A", 2.0, 2.0, 100));
        cache.apply_position(pos("B", 3.0, 3.0, 100));

        let snapshot = cache.snapshot();
        cache.apply_position(pos("A", 50.0, 50.0, 101));

        let ids: Vec<&str> = snapshot.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(snapshot[0].position.latitude, 2.0);
    }

    #[test]
    fn test_generation_counts_real_updates() {
        let cache = FlightCache::default();
        assert_eq!(cache.generation(), 0);

        cache.apply_position(pos("X", 40.0, -73.0, 100));
        cache.apply_identity(ident("X", "DAL1", None, None));
        cache.apply_identity(ident("Z", "DAL2", None, None));
        cache.update_positions(|p| p.clone());

        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn test_evict_stale_records() {
        let cache = FlightCache::new(CacheConfig {
            stale_after: Duration::ZERO,
            ..Default::default()
        });
        cache.apply_position(pos("X", 40.0, -73.0, 100));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.evict_stale(), 1);
        assert!(cache.get("X").is_none());
    }

    #[test]
    fn test_evict_keeps_fresh_records() {
        let cache = FlightCache::default();
        cache.apply_position(pos("X", 40.0, -73.0, 100));

        assert_eq!(cache.evict_stale(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_seed_does_not_overwrite_live_records() {
        let cache = FlightCache::default();
        cache.apply_position(pos("X", 40.0, -73.0, 100));

        let stale_x = FlightRecord::first_sighting("X", pos("X", 1.0, 1.0, 50).to_position(
            DateTime::from_timestamp(50, 0).unwrap(),
        ));
        let y = FlightRecord::first_sighting("Y", pos("Y", 2.0, 2.0, 50).to_position(
            DateTime::from_timestamp(50, 0).unwrap(),
        ));

        assert_eq!(cache.seed(vec![stale_x, y]), 1);
        assert_eq!(cache.get("X").unwrap().position.latitude, 40.0);
        assert!(cache.get("Y").is_some());
    }
}
