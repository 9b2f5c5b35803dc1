//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let feed = &config.feed;
    let broadcast = &config.broadcast;
    let interpolation = &config.interpolation;
    let cache = &config.cache;

    let ca_file = feed
        .ca_file
        .as_ref()
        .map(|p| path_to_string(p))
        .unwrap_or_default();
    let snapshot_file = cache
        .snapshot_file
        .as_ref()
        .map(|p| path_to_string(p))
        .unwrap_or_default();

    format!(
        r#"[feed]
; Upstream position feed endpoint
host = {}
port = {}
; Encrypt the feed connection (only disable for local testing)
tls = {}
; Extra PEM CA certificate trusted in addition to the public roots (optional)
ca_file = {}
; Feed credentials, sent on the login line after connecting
username = {}
password = {}
; Selector sent on the subscribe line
subscription = {}
; Seconds to wait between reconnect attempts (default: 5)
reconnect_delay_secs = {}
; Consecutive failed connections before giving up (default: 5)
max_reconnect_attempts = {}
; Seconds without any data before the connection is considered dead (default: 60)
read_timeout_secs = {}
; Seconds allowed for TCP connect and TLS handshake (default: 15)
connect_timeout_secs = {}

[server]
; WebSocket endpoint for subscribers
listen = {}

[broadcast]
; Milliseconds between flight pushes to subscribers (default: 1000)
interval_ms = {}
; Seconds between subscriber liveness probes (default: 30)
; A subscriber that does not answer by the next probe is disconnected.
liveness_interval_secs = {}
; Frames queued per subscriber before pushes to it are skipped (default: 16)
subscriber_buffer = {}
; Seconds allowed for one write to a subscriber (default: 10)
write_timeout_secs = {}

[interpolation]
; Move aircraft along their heading between real reports
enabled = {}
; Milliseconds between interpolation steps (default: 250)
tick_ms = {}
; Degrees moved per step (default: 0.0001)
step = {}
; Maximum random offset per step in degrees, 0 to disable (default: 0)
jitter = {}

[cache]
; Seconds without a real report before an aircraft is dropped (default: 600)
stale_after_secs = {}
; Seconds to hold identity reports that arrive before the first position
; (default: 0, drop them)
orphan_grace_secs = {}
; Seconds between stale-aircraft sweeps (default: 60)
maintenance_interval_secs = {}
; Snapshot file used to restore flights on restart (empty to disable)
snapshot_file = {}
; Seconds between snapshot writes when flights changed (default: 30)
snapshot_interval_secs = {}
; Snapshots older than this many seconds are ignored on start (default: 900)
snapshot_max_age_secs = {}

[logging]
; Log directory and file name (the file is cleared on each start)
directory = {}
file = {}
"#,
        feed.host,
        feed.port,
        feed.tls,
        ca_file,
        feed.username,
        feed.password,
        feed.subscription,
        feed.reconnect_delay_secs,
        feed.max_reconnect_attempts,
        feed.read_timeout_secs,
        feed.connect_timeout_secs,
        config.server.listen,
        broadcast.interval_ms,
        broadcast.liveness_interval_secs,
        broadcast.subscriber_buffer,
        broadcast.write_timeout_secs,
        interpolation.enabled,
        interpolation.tick_ms,
        interpolation.step,
        interpolation.jitter,
        cache.stale_after_secs,
        cache.orphan_grace_secs,
        cache.maintenance_interval_secs,
        snapshot_file,
        cache.snapshot_interval_secs,
        cache.snapshot_max_age_secs,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Render a path, collapsing the home directory back to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
