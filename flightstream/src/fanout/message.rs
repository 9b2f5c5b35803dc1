//! Subscriber wire messages (JSON over WebSocket text frames).
//!
//! Inbound:
//!
//! ```json
//! {"type": "ping"}
//! {"type": "setFilter", "filter": "cargo"}
//! ```
//!
//! Outbound:
//!
//! ```json
//! {"type": "pong", "timestamp": 1700000000000}
//! {"type": "flights", "flights": [...], "timestamp": 1700000000000}
//! {"type": "<event>", "data": {...}, "timestamp": 1700000000000}
//! ```
//!
//! Timestamps are Unix epoch milliseconds.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::filter::FlightFilter;
use crate::flight::FlightRecord;

/// Message sent by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Ping,
    SetFilter { filter: FlightFilter },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Message pushed to a subscriber.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage<'a> {
    Pong {
        timestamp: i64,
    },
    Flights {
        flights: Vec<&'a FlightRecord>,
        timestamp: i64,
    },
}

impl<'a> ServerMessage<'a> {
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_millis(),
        }
    }

    pub fn flights(flights: Vec<&'a FlightRecord>) -> Self {
        Self::Flights {
            flights,
            timestamp: now_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Generic named event for the surrounding system.
#[derive(Debug, Serialize)]
pub struct EventEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub data: &'a T,
    pub timestamp: i64,
}

impl<'a, T: Serialize> EventEnvelope<'a, T> {
    pub fn new(kind: &'a str, data: &'a T) -> Self {
        Self {
            kind,
            data,
            timestamp: now_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
