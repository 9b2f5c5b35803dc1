//! Partial updates applied to the flight cache.
//!
//! The upstream feed never sends a whole [`FlightRecord`](super::FlightRecord);
//! it sends either a position report or an identity/route report. Both are
//! keyed by aircraft id and merged into the cache.

use chrono::{DateTime, Utc};

use super::model::{FlightStatus, Position};

/// A real position report for one aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: f64,
    pub heading_deg: f64,
    pub ground_speed_kt: f64,
    /// Upstream source tag for the report (e.g. `A` for ADS-B).
    pub update_type: String,
    pub timestamp: DateTime<Utc>,
    pub squawk: Option<String>,
}

impl PositionUpdate {
    /// The position this update carries, with the given timestamp.
    pub fn to_position(&self, timestamp: DateTime<Utc>) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude_ft: self.altitude_ft,
            heading_deg: self.heading_deg,
            ground_speed_kt: self.ground_speed_kt,
            vertical_speed_fpm: 0.0,
            timestamp,
        }
    }
}

/// An identity/route report for one aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityUpdate {
    pub id: String,
    pub callsign: String,
    /// Origin airport ICAO, `None` when the feed sent `none`.
    pub origin: Option<String>,
    /// Destination airport ICAO, `None` when the feed sent `none`.
    pub destination: Option<String>,
    /// Explicit status change, if the report carried one.
    pub status: Option<FlightStatus>,
}
