//! Subscriber fan-out: per-subscriber filters, the registry, the periodic
//! broadcaster and the WebSocket endpoint.
//!
//! ```text
//!  FlightCache ──snapshot──► Broadcaster ──broadcast()──► SubscriberRegistry
//!                                                           │ try_send
//!                                            ┌──────────────┼──────────────┐
//!                                            ▼              ▼              ▼
//!                                         writer         writer         writer
//!                                            │              │              │
//!                                        WebSocket      WebSocket      WebSocket
//! ```

mod broadcaster;
mod filter;
mod message;
mod registry;
mod server;

pub use broadcaster::{
    BroadcastConfig, Broadcaster, DEFAULT_BROADCAST_INTERVAL, DEFAULT_LIVENESS_INTERVAL,
    DEFAULT_SUBSCRIBER_BUFFER, DEFAULT_WRITE_TIMEOUT,
};
pub use filter::FlightFilter;
pub use message::{now_millis, ClientMessage, EventEnvelope, ServerMessage};
pub use registry::{
    Outbound, ProbeStats, PushStats, SubscriberRegistry, Subscription, SubscriptionId,
};
pub use server::{ServerConfig, ServerError, SubscriberServer, DEFAULT_LISTEN_PORT};
