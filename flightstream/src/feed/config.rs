//! Configuration for the upstream feed client.

use std::path::PathBuf;
use std::time::Duration;

/// Default upstream host.
pub const DEFAULT_FEED_HOST: &str = "firehose.flightstream.example";

/// Default upstream TLS port.
pub const DEFAULT_FEED_PORT: u16 = 1501;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Default number of consecutive failures before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default time without any data before the connection is considered dead.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Default time allowed for TCP connect plus TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default subscription selector sent after login.
pub const DEFAULT_SUBSCRIPTION: &str = "events position,flight";

/// Configuration for the feed client and its transport.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub host: String,
    pub port: u16,

    /// Encrypt the connection. Only disable for local testing.
    pub tls: bool,

    /// Extra CA certificate (PEM) trusted in addition to the web PKI roots.
    pub ca_file: Option<PathBuf>,

    pub username: String,
    pub password: String,

    /// Selector sent on the subscription line.
    pub subscription: String,

    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
}

impl FeedConfig {
    /// First line sent after connecting.
    pub fn credential_line(&self) -> String {
        format!("login {} {}\n", self.username, self.password)
    }

    /// Second line sent after connecting.
    pub fn subscription_line(&self) -> String {
        format!("subscribe {}\n", self.subscription)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FEED_HOST.to_string(),
            port: DEFAULT_FEED_PORT,
            tls: true,
            ca_file: None,
            username: String::new(),
            password: String::new(),
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}
