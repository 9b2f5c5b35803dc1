//! WebSocket endpoint for subscribers.
//!
//! Each accepted connection gets a bounded outbound queue registered with the
//! [`SubscriberRegistry`](super::SubscriberRegistry), a writer task draining
//! that queue into the socket, and a reader handling inbound JSON control
//! messages. Either side ending unregisters the subscriber, which cancels the
//! other side through the subscriber's token.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use super::broadcaster::Broadcaster;
use super::message::{ClientMessage, ServerMessage};
use super::registry::{Outbound, SubscriberRegistry, SubscriptionId};

/// Default subscriber listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Time allowed for the WebSocket upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<TcpStream>;

/// Subscriber endpoint settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
        }
    }
}

/// Errors from the subscriber endpoint.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind subscriber endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Subscriber endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepts WebSocket subscribers and wires them to the broadcaster.
pub struct SubscriberServer {
    listener: TcpListener,
    broadcaster: Broadcaster,
}

impl SubscriberServer {
    /// Bind the listen socket.
    pub async fn bind(config: &ServerConfig, broadcaster: Broadcaster) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self {
            listener,
            broadcaster,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until cancelled, then wait for open connections
    /// to close.
    pub async fn run(self, cancellation: CancellationToken) {
        let addr = self.listener.local_addr().ok();
        tracing::info!(addr = ?addr, "Subscriber endpoint listening");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let broadcaster = self.broadcaster.clone();
                        connections.spawn(serve_connection(stream, peer, broadcaster));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept subscriber connection");
                    }
                },
            }
        }

        tracing::debug!(open = connections.len(), "Subscriber endpoint draining connections");
        self.broadcaster.registry().clear();
        while connections.join_next().await.is_some() {}
        tracing::info!("Subscriber endpoint stopped");
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, broadcaster: Broadcaster) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let ws = match tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream))
        .await
    {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::debug!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!(peer = %peer, "WebSocket handshake timed out");
            return;
        }
    };

    let config = broadcaster.config().clone();
    let (tx, rx) = mpsc::channel(config.subscriber_buffer.max(1));
    let subscription = broadcaster.register_subscriber(tx);
    let registry = Arc::clone(broadcaster.registry());
    tracing::debug!(peer = %peer, subscriber = %subscription.id, "Subscriber connected");

    let (sink, stream) = ws.split();
    let writer = tokio::spawn(write_loop(
        sink,
        rx,
        subscription.id,
        Arc::clone(&registry),
        subscription.cancellation.clone(),
        config.write_timeout,
    ));

    read_loop(stream, subscription.id, &registry, &subscription.cancellation).await;
    registry.unregister(subscription.id);

    if let Err(e) = writer.await {
        tracing::warn!(subscriber = %subscription.id, error = %e, "Subscriber writer task failed");
    }
    tracing::debug!(peer = %peer, subscriber = %subscription.id, "Subscriber disconnected");
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    id: SubscriptionId,
    registry: Arc<SubscriberRegistry>,
    cancellation: CancellationToken,
    write_timeout: Duration,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let message = match item {
            Outbound::Frame(text) => Message::Text(text.to_string()),
            Outbound::Probe => Message::Ping(Vec::new()),
        };

        match tokio::time::timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(subscriber = %id, error = %e, "Subscriber write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(subscriber = %id, timeout = ?write_timeout, "Subscriber write timed out");
                break;
            }
        }
    }

    registry.unregister(id);
    let _ = tokio::time::timeout(write_timeout, sink.close()).await;
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    id: SubscriptionId,
    registry: &SubscriberRegistry,
    cancellation: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            next = stream.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::debug!(subscriber = %id, error = %e, "Subscriber read failed");
                break;
            }
            None => break,
        };

        registry.mark_alive(id);
        match message {
            Message::Text(text) => handle_text(&text, id, registry),
            Message::Close(_) => break,
            _ => {}
        }
    }
}

fn handle_text(text: &str, id: SubscriptionId, registry: &SubscriberRegistry) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Ping) => match ServerMessage::pong().to_json() {
            Ok(json) => {
                registry.send(id, Outbound::Frame(Arc::from(json)));
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialise pong"),
        },
        Ok(ClientMessage::SetFilter { filter }) => {
            registry.set_filter(id, filter);
        }
        Err(e) => {
            tracing::debug!(subscriber = %id, error = %e, "Ignoring malformed subscriber message");
        }
    }
}
