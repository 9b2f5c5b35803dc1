//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [feed] section
    if let Some(section) = ini.section(Some("feed")) {
        let feed = &mut config.feed;
        if let Some(v) = non_empty(section, "host") {
            feed.host = v.to_string();
        }
        if let Some(v) = section.get("port") {
            feed.port = parse_positive(v, "feed", "port", "must be a port number (1-65535)")?;
        }
        if let Some(v) = section.get("tls") {
            feed.tls = parse_bool(v);
        }
        if let Some(v) = section.get("ca_file") {
            feed.ca_file = optional_path(v);
        }
        if let Some(v) = section.get("username") {
            feed.username = v.trim().to_string();
        }
        if let Some(v) = section.get("password") {
            feed.password = v.trim().to_string();
        }
        if let Some(v) = non_empty(section, "subscription") {
            feed.subscription = v.to_string();
        }
        if let Some(v) = section.get("reconnect_delay_secs") {
            feed.reconnect_delay_secs = parse_number(
                v,
                "feed",
                "reconnect_delay_secs",
                "must be a non-negative integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("max_reconnect_attempts") {
            feed.max_reconnect_attempts = parse_positive(
                v,
                "feed",
                "max_reconnect_attempts",
                "must be a positive integer",
            )?;
        }
        if let Some(v) = section.get("read_timeout_secs") {
            feed.read_timeout_secs = parse_positive(
                v,
                "feed",
                "read_timeout_secs",
                "must be a positive integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("connect_timeout_secs") {
            feed.connect_timeout_secs = parse_positive(
                v,
                "feed",
                "connect_timeout_secs",
                "must be a positive integer (seconds)",
            )?;
        }
    }

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("listen") {
            config.server.listen = parse_number(
                v,
                "server",
                "listen",
                "expected an address like '0.0.0.0:8080'",
            )?;
        }
    }

    // [broadcast] section
    if let Some(section) = ini.section(Some("broadcast")) {
        let broadcast = &mut config.broadcast;
        if let Some(v) = section.get("interval_ms") {
            broadcast.interval_ms = parse_positive(
                v,
                "broadcast",
                "interval_ms",
                "must be a positive integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("liveness_interval_secs") {
            broadcast.liveness_interval_secs = parse_positive(
                v,
                "broadcast",
                "liveness_interval_secs",
                "must be a positive integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("subscriber_buffer") {
            broadcast.subscriber_buffer = parse_positive(
                v,
                "broadcast",
                "subscriber_buffer",
                "must be a positive integer",
            )?;
        }
        if let Some(v) = section.get("write_timeout_secs") {
            broadcast.write_timeout_secs = parse_positive(
                v,
                "broadcast",
                "write_timeout_secs",
                "must be a positive integer (seconds)",
            )?;
        }
    }

    // [interpolation] section
    if let Some(section) = ini.section(Some("interpolation")) {
        let interpolation = &mut config.interpolation;
        if let Some(v) = section.get("enabled") {
            interpolation.enabled = parse_bool(v);
        }
        if let Some(v) = section.get("tick_ms") {
            interpolation.tick_ms = parse_positive(
                v,
                "interpolation",
                "tick_ms",
                "must be a positive integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("step") {
            interpolation.step = parse_degrees(v, "interpolation", "step")?;
        }
        if let Some(v) = section.get("jitter") {
            interpolation.jitter = parse_degrees(v, "interpolation", "jitter")?;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        let cache = &mut config.cache;
        if let Some(v) = section.get("stale_after_secs") {
            cache.stale_after_secs = parse_positive(
                v,
                "cache",
                "stale_after_secs",
                "must be a positive integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("orphan_grace_secs") {
            cache.orphan_grace_secs = parse_number(
                v,
                "cache",
                "orphan_grace_secs",
                "must be a non-negative integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("maintenance_interval_secs") {
            cache.maintenance_interval_secs = parse_positive(
                v,
                "cache",
                "maintenance_interval_secs",
                "must be a positive integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("snapshot_file") {
            cache.snapshot_file = optional_path(v);
        }
        if let Some(v) = section.get("snapshot_interval_secs") {
            cache.snapshot_interval_secs = parse_positive(
                v,
                "cache",
                "snapshot_interval_secs",
                "must be a positive integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("snapshot_max_age_secs") {
            cache.snapshot_max_age_secs = parse_number(
                v,
                "cache",
                "snapshot_max_age_secs",
                "must be a non-negative integer (seconds)",
            )?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(
    value: &str,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn parse_positive<T>(value: &str, section: &str, key: &str, reason: &str) -> Result<T, ConfigFileError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = parse_number(value, section, key, reason)?;
    if parsed <= T::default() {
        return Err(invalid(section, key, value, reason));
    }
    Ok(parsed)
}

fn parse_degrees(value: &str, section: &str, key: &str) -> Result<f64, ConfigFileError> {
    let reason = "must be a non-negative number of degrees below 1.0";
    let parsed: f64 = parse_number(value, section, key, reason)?;
    if !parsed.is_finite() || !(0.0..1.0).contains(&parsed) {
        return Err(invalid(section, key, value, reason));
    }
    Ok(parsed)
}

fn optional_path(value: &str) -> Option<PathBuf> {
    let v = value.trim();
    if v.is_empty() {
        None
    } else {
        Some(expand_tilde(v))
    }
}

/// Parse a boolean value.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
