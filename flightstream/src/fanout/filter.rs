//! Per-subscriber flight filters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::flight::FlightRecord;

/// ICAO designators of dedicated cargo operators.
const CARGO_PREFIXES: &[&str] = &[
    "ABW", "ABX", "ATN", "BCS", "BOX", "CAO", "CKK", "CKS", "CLX", "DHK", "DHX", "FDX", "GEC",
    "GTI", "NCA", "PAC", "SQC", "UPS",
];

/// Which flights a subscriber wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightFilter {
    #[default]
    All,
    /// Flights with a known airline.
    Commercial,
    /// Flights without an airline.
    Private,
    Cargo,
}

impl FlightFilter {
    pub const ALL: [FlightFilter; 4] = [Self::All, Self::Commercial, Self::Private, Self::Cargo];

    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &FlightRecord) -> bool {
        match self {
            Self::All => true,
            Self::Commercial => record.airline_name().is_some(),
            Self::Private => record.airline_name().is_none(),
            Self::Cargo => is_cargo(record),
        }
    }

    /// Records from `flights` that pass this filter.
    pub fn apply<'a>(&self, flights: &'a [FlightRecord]) -> Vec<&'a FlightRecord> {
        flights.iter().filter(|record| self.matches(record)).collect()
    }
}

fn is_cargo(record: &FlightRecord) -> bool {
    let callsign = record.callsign.as_deref().unwrap_or_default().to_ascii_uppercase();
    let airline = record.airline_name().unwrap_or_default().to_ascii_uppercase();

    callsign.contains("CARGO")
        || airline.contains("CARGO")
        || CARGO_PREFIXES
            .iter()
            .any(|prefix| callsign.starts_with(prefix))
}

impl fmt::Display for FlightFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Commercial => "commercial",
            Self::Private => "private",
            Self::Cargo => "cargo",
        };
        f.write_str(name)
    }
}

impl FromStr for FlightFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "commercial" => Ok(Self::Commercial),
            "private" => Ok(Self::Private),
            "cargo" => Ok(Self::Cargo),
            other => Err(format!(
                "unknown filter '{}' (expected all, commercial, private or cargo)",
                other
            )),
        }
    }
}
