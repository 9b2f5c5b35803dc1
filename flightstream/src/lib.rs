//! FlightStream - live flight ingestion and fan-out
//!
//! This library keeps one long-lived connection to an upstream position
//! feed, merges its partial, out-of-order reports into an in-memory flight
//! cache, animates positions between reports, and pushes filtered snapshots
//! to any number of WebSocket subscribers.
//!
//! # Architecture
//!
//! ```text
//!   upstream feed (TLS/TCP, line protocol)
//!          │
//!          ▼
//!   feed::IngestionClient ──apply──► flight::FlightCache ◄──step── animation::Interpolator
//!                                          │
//!                                       snapshot
//!                                          ▼
//!                                  fanout::Broadcaster ──► fanout::SubscriberRegistry
//!                                                                  │
//!                                                       WebSocket subscribers
//! ```
//!
//! [`supervisor::LivePipeline`] starts and owns every task.

pub mod animation;
pub mod config;
pub mod fanout;
pub mod feed;
pub mod flight;
pub mod logging;
pub mod supervisor;

pub use supervisor::{LivePipeline, PipelineConfig, PipelineError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
