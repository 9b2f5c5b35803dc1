//! Streaming Ingestion Client - owns the upstream feed connection.
//!
//! # State Machine
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Authenticating --lines sent--> Streaming
//!      ^                        |                    |                          |
//!      +-------- error ---------+------- error ------+--- error/timeout/close --+
//!
//! Disconnected --(attempts == max)--> GaveUp      (terminal)
//! Streaming    --"auth failed"------> Rejected    (terminal)
//! any          --cancellation-------> Shutdown    (terminal)
//! ```
//!
//! The client sends the credential line and the subscription line and goes
//! straight to `Streaming`; the feed starts pushing immediately, and a later
//! `auth failed` control line ends the client without any further attempt
//! using the same credentials.
//!
//! Every consecutive failure increments an attempt counter; a successful
//! connection resets it. When the counter reaches the configured maximum the
//! client gives up and returns [`FeedError::RetriesExhausted`].
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(FlightCache::default());
//! let connector = Arc::new(TcpConnector::from_config(&config)?);
//! let client = IngestionClient::new(config, connector, Arc::clone(&cache));
//! let mut state = client.state();
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(client.run(shutdown.clone()));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::FeedConfig;
use super::error::FeedError;
use super::framer::LineFramer;
use super::protocol::{parse_line, AuthResult, ControlMessage, FeedMessage};
use super::transport::{BoxedFeedStream, FeedConnector};
use crate::flight::FlightCache;

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Connection state of the ingestion client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Streaming,
    /// Reconnect attempts exhausted.
    GaveUp,
    /// Upstream refused the credentials.
    Rejected,
    /// Closed on request.
    Shutdown,
}

impl FeedState {
    /// True once the client will never connect again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GaveUp | Self::Rejected | Self::Shutdown)
    }
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Streaming => write!(f, "Streaming"),
            Self::GaveUp => write!(f, "Gave up"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Counters for one client lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub connections: u64,
    pub lines: u64,
    pub positions: u64,
    pub identities: u64,
    pub unrecognized: u64,
}

/// How one streaming session ended without an error.
enum SessionEnd {
    Cancelled,
}

/// Upstream feed client.
pub struct IngestionClient {
    config: FeedConfig,
    connector: Arc<dyn FeedConnector>,
    cache: Arc<FlightCache>,
    state_tx: watch::Sender<FeedState>,
    stats: FeedStats,
}

impl IngestionClient {
    pub fn new(
        config: FeedConfig,
        connector: Arc<dyn FeedConnector>,
        cache: Arc<FlightCache>,
    ) -> Self {
        let (state_tx, _) = watch::channel(FeedState::Disconnected);
        Self {
            config,
            connector,
            cache,
            state_tx,
            stats: FeedStats::default(),
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<FeedState> {
        self.state_tx.subscribe()
    }

    /// Run until cancelled or a terminal failure.
    ///
    /// Returns `Ok(())` on cancellation and the terminal error otherwise.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), FeedError> {
        let endpoint = self.connector.endpoint();
        info!(endpoint = %endpoint, "Feed client starting");

        let mut attempts: u32 = 0;
        let mut framer = LineFramer::default();

        let result = loop {
            self.set_state(FeedState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                result = self.connector.connect() => result,
            };

            let failure = match connected {
                Ok(stream) => {
                    attempts = 0;
                    self.stats.connections += 1;
                    framer.reset();
                    match self.session(stream, &mut framer, &shutdown).await {
                        Ok(SessionEnd::Cancelled) => break Ok(()),
                        Err(FeedError::AuthRejected) => break Err(FeedError::AuthRejected),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            self.set_state(FeedState::Disconnected);
            attempts += 1;
            warn!(
                endpoint = %endpoint,
                error = %failure,
                attempt = attempts,
                max_attempts = self.config.max_reconnect_attempts,
                "Feed connection lost"
            );

            if attempts >= self.config.max_reconnect_attempts {
                break Err(FeedError::RetriesExhausted { attempts });
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        };

        let stats = self.stats;
        match &result {
            Ok(()) => {
                self.set_state(FeedState::Shutdown);
                info!(?stats, "Feed client stopped");
            }
            Err(FeedError::AuthRejected) => {
                self.set_state(FeedState::Rejected);
                error!(
                    endpoint = %endpoint,
                    ?stats,
                    "Feed rejected credentials; not reconnecting until configuration changes"
                );
            }
            Err(e) => {
                self.set_state(FeedState::GaveUp);
                error!(endpoint = %endpoint, error = %e, ?stats, "Feed client gave up");
            }
        }
        result
    }

    /// Handshake and stream one connection until it fails or is cancelled.
    async fn session(
        &mut self,
        mut stream: BoxedFeedStream,
        framer: &mut LineFramer,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd, FeedError> {
        self.set_state(FeedState::Authenticating);
        stream
            .write_all(self.config.credential_line().as_bytes())
            .await?;
        stream
            .write_all(self.config.subscription_line().as_bytes())
            .await?;
        stream.flush().await?;

        self.set_state(FeedState::Streaming);
        info!(endpoint = %self.connector.endpoint(), "Feed streaming");

        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(SessionEnd::Cancelled),
                read = tokio::time::timeout(self.config.read_timeout, stream.read(&mut buffer)) => read,
            };

            let len = match read {
                Ok(Ok(0)) => return Err(FeedError::ClosedByRemote),
                Ok(Ok(len)) => len,
                Ok(Err(e)) => return Err(FeedError::Io(e)),
                Err(_) => return Err(FeedError::ReadTimeout(self.config.read_timeout)),
            };

            for line in framer.push(&buffer[..len]) {
                self.handle_line(&line)?;
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Result<(), FeedError> {
        self.stats.lines += 1;
        match parse_line(line) {
            FeedMessage::Position(update) => {
                self.stats.positions += 1;
                self.cache.apply_position(update);
            }
            FeedMessage::Identity(update) => {
                self.stats.identities += 1;
                self.cache.apply_identity(update);
            }
            FeedMessage::Control(ControlMessage::Auth(AuthResult::Rejected)) => {
                return Err(FeedError::AuthRejected);
            }
            FeedMessage::Control(ControlMessage::Auth(AuthResult::Accepted)) => {
                info!("Feed accepted credentials");
            }
            FeedMessage::Control(ControlMessage::Clock(payload)) => {
                trace!(payload = %payload, "Feed clock sync");
            }
            FeedMessage::Unrecognized(raw) => {
                self.stats.unrecognized += 1;
                if self.stats.unrecognized <= 5 {
                    debug!(line = %raw, "Discarding unrecognized feed line");
                } else {
                    trace!(line = %raw, "Discarding unrecognized feed line");
                }
            }
        }
        Ok(())
    }

    fn set_state(&self, state: FeedState) {
        self.state_tx.send_replace(state);
        debug!(state = %state, "Feed state");
    }
}

/// Wait until the client reaches `target` or any terminal state.
///
/// Returns the state observed.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<FeedState>,
    target: FeedState,
    timeout: Duration,
) -> Option<FeedState> {
    let waited = tokio::time::timeout(
        timeout,
        rx.wait_for(|state| *state == target || state.is_terminal()),
    )
    .await;
    match waited {
        Ok(Ok(state)) => Some(*state),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};

    /// Connector whose connections are scripted by the test.
    ///
    /// Each `connect()` pops the next prepared stream; when none are left it
    /// fails with a refused connection.
    struct ScriptedConnector {
        streams: Mutex<Vec<DuplexStream>>,
        attempts: AtomicU32,
    }

    impl ScriptedConnector {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(Vec::new()),
                attempts: AtomicU32::new(0),
            })
        }

        /// Prepare one connection and return the server side of it.
        fn prepare(&self) -> DuplexStream {
            let (client, server) = duplex(64 * 1024);
            self.streams.lock().insert(0, client);
            server
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl FeedConnector for ScriptedConnector {
        fn connect(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<BoxedFeedStream, FeedError>> + Send + '_>> {
            Box::pin(async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                match self.streams.lock().pop() {
                    Some(stream) => Ok(Box::new(stream) as BoxedFeedStream),
                    None => Err(FeedError::Io(std::io::Error::from(
                        std::io::ErrorKind::ConnectionRefused,
                    ))),
                }
            })
        }

        fn endpoint(&self) -> String {
            "scripted://feed".to_string()
        }
    }

    fn fast_config() -> FeedConfig {
        FeedConfig {
            username: "ops".to_string(),
            password: "s3cret".to_string(),
            reconnect_delay: Duration::from_millis(5),
            read_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let connector = ScriptedConnector::failing();
        let cache = Arc::new(FlightCache::default());
        let client = IngestionClient::new(fast_config(), connector.clone(), cache);
        let state = client.state();

        let result = client.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(FeedError::RetriesExhausted { attempts: 5 })));
        assert_eq!(connector.attempts(), 5);
        assert_eq!(*state.borrow(), FeedState::GaveUp);
    }

    #[tokio::test]
    async fn test_handshake_and_updates_reach_cache() {
        let connector = ScriptedConnector::failing();
        let server = connector.prepare();
        let cache = Arc::new(FlightCache::default());
        let client = IngestionClient::new(fast_config(), connector.clone(), Arc::clone(&cache));
        let mut state = client.state();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(client.run(shutdown.clone()));

        let (read_half, mut write_half) = tokio::io::split(server);
        let mut lines = BufReader::new(read_half).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "login ops s3cret");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "subscribe events position,flight"
        );

        write_half
            .write_all(b"auth ok\npos a1 40.0 -73.0 3500 90 200 A 1700000000 none\nflight a1 DAL")
            .await
            .unwrap();
        write_half.write_all(b"123 KJFK none\ngarbage line\n").await.unwrap();

        assert_eq!(
            wait_for_state(&mut state, FeedState::Streaming, Duration::from_secs(1)).await,
            Some(FeedState::Streaming)
        );
        for _ in 0..100 {
            if cache.get("a1").and_then(|r| r.departure).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let record = cache.get("a1").expect("position applied");
        assert_eq!(record.callsign.as_deref(), Some("DAL123"));
        assert_eq!(record.departure.unwrap().icao.as_deref(), Some("KJFK"));

        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(*state.borrow(), FeedState::Shutdown);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_without_reconnect() {
        let connector = ScriptedConnector::failing();
        let mut server = connector.prepare();
        // A second connection is available but must never be used.
        let _spare = connector.prepare();
        let cache = Arc::new(FlightCache::default());
        let client = IngestionClient::new(fast_config(), connector.clone(), cache);
        let state = client.state();

        server.write_all(b"auth failed\n").await.unwrap();
        let result = client.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(FeedError::AuthRejected)));
        assert_eq!(connector.attempts(), 1);
        assert_eq!(*state.borrow(), FeedState::Rejected);
    }

    #[tokio::test]
    async fn test_successful_connection_resets_attempts() {
        let connector = ScriptedConnector::failing();
        // Connections 1-4 fail, then one succeeds and closes, then 5 more fail.
        let cache = Arc::new(FlightCache::default());
        let config = FeedConfig {
            reconnect_delay: Duration::from_millis(20),
            ..fast_config()
        };
        let client = IngestionClient::new(config, connector.clone(), cache);

        let shutdown = CancellationToken::new();
        let connector_clone = connector.clone();
        let feeder = tokio::spawn(async move {
            while connector_clone.attempts() < 4 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            // Server side dropped immediately: the session ends with a remote close.
            drop(connector_clone.prepare());
        });

        let result = client.run(shutdown).await;
        feeder.await.unwrap();

        assert!(matches!(result, Err(FeedError::RetriesExhausted { attempts: 5 })));
        assert!(connector.attempts() >= 9);
    }

    #[tokio::test]
    async fn test_remote_close_triggers_reconnect() {
        let connector = ScriptedConnector::failing();
        let first = connector.prepare();
        let mut second = connector.prepare();
        let cache = Arc::new(FlightCache::default());
        let client = IngestionClient::new(fast_config(), connector.clone(), Arc::clone(&cache));

        drop(first);
        second
            .write_all(b"pos b2 10.0 10.0 1000 0 100 A 1700000000 none\n")
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(client.run(shutdown.clone()));

        for _ in 0..200 {
            if cache.get("b2").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(cache.get("b2").is_some());
        assert_eq!(connector.attempts(), 2);

        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let connector = ScriptedConnector::failing();
        let _server = connector.prepare();
        let cache = Arc::new(FlightCache::default());
        let client = IngestionClient::new(fast_config(), connector, cache);
        let mut state = client.state();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(client.run(shutdown.clone()));
        wait_for_state(&mut state, FeedState::Streaming, Duration::from_secs(1)).await;

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.expect("client stops promptly").unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_read_timeout_counts_as_failure() {
        let connector = ScriptedConnector::failing();
        let _server = connector.prepare();
        let cache = Arc::new(FlightCache::default());
        let config = FeedConfig {
            read_timeout: Duration::from_millis(20),
            max_reconnect_attempts: 1,
            ..fast_config()
        };
        let client = IngestionClient::new(config, connector, cache);

        let result = client.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(FeedError::RetriesExhausted { attempts: 1 })));
    }

    #[test]
    fn test_terminal_states() {
        assert!(FeedState::GaveUp.is_terminal());
        assert!(FeedState::Rejected.is_terminal());
        assert!(FeedState::Shutdown.is_terminal());
        assert!(!FeedState::Streaming.is_terminal());
        assert!(!FeedState::Disconnected.is_terminal());
    }
}
