//! Upstream feed: line protocol, framing, transport and the reconnecting
//! ingestion client.

mod client;
mod config;
mod error;
mod framer;
mod protocol;
mod transport;

pub use client::{wait_for_state, FeedState, FeedStats, IngestionClient};
pub use config::{
    FeedConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FEED_HOST, DEFAULT_FEED_PORT,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_RECONNECT_DELAY_SECS,
    DEFAULT_SUBSCRIPTION,
};
pub use error::FeedError;
pub use framer::{LineFramer, DEFAULT_MAX_LINE_LENGTH};
pub use protocol::{parse_line, AuthResult, ControlMessage, FeedMessage};
pub use transport::{BoxedFeedStream, FeedConnector, FeedStream, TcpConnector};
