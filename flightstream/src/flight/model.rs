//! Flight record types shared by the cache, the feed and the fan-out layer.
//!
//! A [`FlightRecord`] is the full state the pipeline knows about one aircraft.
//! Identity attributes are sticky (set once, never erased by a later update
//! that lacks them); the [`Position`] is always replaced wholesale.
//!
//! Records serialize to camelCase JSON because they are pushed verbatim to
//! browser subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Airline name assigned to aircraft first seen through a position report.
pub const UNKNOWN_AIRLINE: &str = "Unknown Airline";

/// Operational status of a tracked flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightStatus {
    #[default]
    Active,
    Delayed,
    Cancelled,
    Diverted,
    Landed,
}

impl FlightStatus {
    /// Parse a status token as it appears on the wire (case-insensitive).
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "delayed" => Some(Self::Delayed),
            "cancelled" => Some(Self::Cancelled),
            "diverted" => Some(Self::Diverted),
            "landed" => Some(Self::Landed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Delayed => write!(f, "delayed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Diverted => write!(f, "diverted"),
            Self::Landed => write!(f, "landed"),
        }
    }
}

/// Operating airline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Airline {
    pub name: Option<String>,
    pub icao_code: Option<String>,
    pub iata_code: Option<String>,
}

impl Airline {
    /// Airline known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Departure or arrival airport of a flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEndpoint {
    pub icao: Option<String>,
    pub iata: Option<String>,
    pub name: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl RouteEndpoint {
    /// Endpoint known only by its ICAO code.
    pub fn from_icao(icao: impl Into<String>) -> Self {
        Self {
            icao: Some(icao.into()),
            ..Default::default()
        }
    }
}

/// Most recent known position of an aircraft, real or interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,

    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,

    /// Altitude in feet.
    pub altitude_ft: f64,

    /// True heading in degrees (0-360).
    pub heading_deg: f64,

    /// Ground speed in knots.
    pub ground_speed_kt: f64,

    /// Vertical speed in feet per minute (0 when the feed does not report it).
    pub vertical_speed_fpm: f64,

    /// When this position was observed or interpolated.
    pub timestamp: DateTime<Utc>,
}

/// Full state of one tracked aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    /// Upstream hex/mode-S code, or callsign when no code is known.
    pub id: String,
    pub callsign: Option<String>,
    pub flight_number: Option<String>,
    pub registration: Option<String>,
    pub aircraft_type: Option<String>,
    pub airline: Option<Airline>,
    pub departure: Option<RouteEndpoint>,
    pub arrival: Option<RouteEndpoint>,
    pub position: Position,
    pub status: FlightStatus,
    pub squawk: Option<String>,
}

impl FlightRecord {
    /// Record for an aircraft first seen through a position report.
    ///
    /// Identity defaults to the aircraft id as callsign and an unknown airline
    /// until an identity update arrives.
    pub fn first_sighting(id: impl Into<String>, position: Position) -> Self {
        let id = id.into();
        Self {
            callsign: Some(id.clone()),
            id,
            flight_number: None,
            registration: None,
            aircraft_type: None,
            airline: Some(Airline::named(UNKNOWN_AIRLINE)),
            departure: None,
            arrival: None,
            position,
            status: FlightStatus::Active,
            squawk: None,
        }
    }

    /// Airline name if one is known.
    pub fn airline_name(&self) -> Option<&str> {
        self.airline.as_ref().and_then(|a| a.name.as_deref())
    }
}
