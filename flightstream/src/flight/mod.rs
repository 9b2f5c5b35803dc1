//! Flight state: record types, partial updates, the live cache and snapshot
//! persistence seams.

mod cache;
mod model;
mod snapshot;
mod update;

pub use cache::{
    CacheConfig, FlightCache, IdentityOutcome, PositionOutcome, DEFAULT_STALE_AFTER,
};
pub use model::{
    Airline, FlightRecord, FlightStatus, Position, RouteEndpoint, UNKNOWN_AIRLINE,
};
pub use snapshot::{
    JsonSnapshotStore, SnapshotError, SnapshotSink, SnapshotSource, DEFAULT_MAX_SNAPSHOT_AGE,
};
pub use update::{IdentityUpdate, PositionUpdate};
