//! Error types for the upstream feed client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while connecting to or streaming from the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// TCP connection could not be established.
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Connection attempt did not complete in time.
    #[error("Connection to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// TLS configuration or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Socket read/write failed.
    #[error("Feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No data arrived within the read timeout.
    #[error("No data received for {0:?}")]
    ReadTimeout(Duration),

    /// The upstream closed the connection.
    #[error("Connection closed by upstream")]
    ClosedByRemote,

    /// The upstream refused our credentials. Not retried.
    #[error("Upstream rejected credentials")]
    AuthRejected,

    /// Every reconnect attempt failed. Not retried.
    #[error("Gave up after {attempts} failed connection attempts")]
    RetriesExhausted { attempts: u32 },
}

impl FeedError {
    /// True for errors that end the client for good.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeedError::AuthRejected | FeedError::RetriesExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FeedError::AuthRejected.is_fatal());
        assert!(FeedError::RetriesExhausted { attempts: 5 }.is_fatal());
        assert!(!FeedError::ClosedByRemote.is_fatal());
        assert!(!FeedError::ReadTimeout(Duration::from_secs(60)).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = FeedError::RetriesExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "Gave up after 5 failed connection attempts");

        let err = FeedError::Connect {
            host: "feed.example.com".to_string(),
            port: 1501,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(err.to_string().contains("feed.example.com:1501"));
    }
}
