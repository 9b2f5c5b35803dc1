//! Upstream feed line protocol.
//!
//! The feed is line-oriented ASCII. Each line is space-delimited and starts
//! with a message tag:
//!
//! ```text
//! pos <id> <lat> <lon> <alt_ft> <heading> <gs_kt> <update_type> <epoch_s> <squawk|none>
//! flight <id> <callsign> <origin|none> <destination|none> [status]
//! auth <ok|failed>
//! clock <anything>
//! ```
//!
//! Parsing is total: every input yields a [`FeedMessage`], and anything that
//! does not fit one of the shapes above becomes [`FeedMessage::Unrecognized`].
//! A position report is never emitted with a partially parsed or non-finite
//! field.

use chrono::{DateTime, Utc};

use crate::flight::{FlightStatus, IdentityUpdate, PositionUpdate};

/// Placeholder token the feed uses for an absent optional field.
const NONE_TOKEN: &str = "none";

/// Number of tokens in a `pos` line, including the tag.
const POSITION_TOKENS: usize = 10;

/// Result of authenticating against the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Accepted,
    Rejected,
}

/// Feed control traffic. Never applied to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Auth(AuthResult),
    /// Clock synchronisation; the payload is kept for logging only.
    Clock(String),
}

/// One parsed upstream line.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Position(PositionUpdate),
    Identity(IdentityUpdate),
    Control(ControlMessage),
    /// Anything else; carries the offending line for diagnostics.
    Unrecognized(String),
}

impl FeedMessage {
    /// True for an `auth failed` control message.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            FeedMessage::Control(ControlMessage::Auth(AuthResult::Rejected))
        )
    }
}

/// Parse one line of upstream text.
pub fn parse_line(line: &str) -> FeedMessage {
    let trimmed = line.trim();
    let tokens: Vec<&str> = trimmed.split_ascii_whitespace().collect();

    let parsed = match tokens.first().copied() {
        Some("pos") => parse_position(&tokens).map(FeedMessage::Position),
        Some("flight") => parse_identity(&tokens).map(FeedMessage::Identity),
        Some("auth") => parse_auth(&tokens).map(FeedMessage::Control),
        Some("clock") => Some(FeedMessage::Control(ControlMessage::Clock(
            tokens[1..].join(" "),
        ))),
        _ => None,
    };

    parsed.unwrap_or_else(|| FeedMessage::Unrecognized(trimmed.to_string()))
}

fn parse_position(tokens: &[&str]) -> Option<PositionUpdate> {
    if tokens.len() != POSITION_TOKENS {
        return None;
    }

    let latitude = parse_finite(tokens[2])?;
    let longitude = parse_finite(tokens[3])?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }

    let altitude_ft = parse_finite(tokens[4])?;
    let heading_deg = normalize_heading(parse_finite(tokens[5])?);
    let ground_speed_kt = parse_finite(tokens[6])?;
    let epoch: i64 = tokens[8].parse().ok()?;
    let timestamp = DateTime::<Utc>::from_timestamp(epoch, 0)?;

    Some(PositionUpdate {
        id: tokens[1].to_string(),
        latitude,
        longitude,
        altitude_ft,
        heading_deg,
        ground_speed_kt,
        update_type: tokens[7].to_string(),
        timestamp,
        squawk: optional(tokens[9]),
    })
}

fn parse_identity(tokens: &[&str]) -> Option<IdentityUpdate> {
    let status = match tokens.len() {
        5 => None,
        6 => Some(FlightStatus::from_token(tokens[5])?),
        _ => return None,
    };

    Some(IdentityUpdate {
        id: tokens[1].to_string(),
        callsign: tokens[2].to_string(),
        origin: optional(tokens[3]),
        destination: optional(tokens[4]),
        status,
    })
}

fn parse_auth(tokens: &[&str]) -> Option<ControlMessage> {
    match tokens {
        [_, "ok"] => Some(ControlMessage::Auth(AuthResult::Accepted)),
        [_, "failed"] => Some(ControlMessage::Auth(AuthResult::Rejected)),
        _ => None,
    }
}

fn parse_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn optional(token: &str) -> Option<String> {
    if token.eq_ignore_ascii_case(NONE_TOKEN) {
        None
    } else {
        Some(token.to_string())
    }
}

/// Normalize heading to 0-360 range.
fn normalize_heading(heading: f64) -> f64 {
    let normalized = heading.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}
