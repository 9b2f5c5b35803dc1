//! Transport seam for the upstream feed.
//!
//! The client talks to the feed through a [`FeedConnector`] that hands back a
//! boxed byte stream. Production uses [`TcpConnector`] (TLS over TCP via
//! `tokio-rustls`); tests inject in-memory duplex streams.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::config::FeedConfig;
use super::error::FeedError;

/// Byte stream carrying the feed protocol.
pub trait FeedStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> FeedStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed feed stream returned by connectors.
pub type BoxedFeedStream = Box<dyn FeedStream>;

/// Opens connections to the upstream feed.
pub trait FeedConnector: Send + Sync + 'static {
    /// Open one connection.
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BoxedFeedStream, FeedError>> + Send + '_>>;

    /// Human-readable endpoint for logging.
    fn endpoint(&self) -> String;
}

/// TCP connector with optional TLS.
pub struct TcpConnector {
    host: String,
    port: u16,
    tls: Option<TlsConnector>,
    connect_timeout: std::time::Duration,
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl TcpConnector {
    /// Build a connector from feed configuration.
    ///
    /// Loads TLS roots up front so a bad CA file fails at startup rather than
    /// on every reconnect.
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        let tls = if config.tls {
            Some(TlsConnector::from(Arc::new(tls_client_config(config)?)))
        } else {
            tracing::warn!(host = %config.host, "Feed TLS disabled, connecting in plaintext");
            None
        };

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            tls,
            connect_timeout: config.connect_timeout,
        })
    }

    async fn open(&self) -> Result<BoxedFeedStream, FeedError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|source| FeedError::Connect {
                host: self.host.clone(),
                port: self.port,
                source,
            })?;
        tcp.set_nodelay(true)?;

        let Some(tls) = &self.tls else {
            return Ok(Box::new(tcp));
        };

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| FeedError::Tls(format!("invalid server name '{}': {}", self.host, e)))?;
        let stream = tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| FeedError::Tls(e.to_string()))?;
        Ok(Box::new(stream))
    }
}

impl FeedConnector for TcpConnector {
    fn connect(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BoxedFeedStream, FeedError>> + Send + '_>> {
        Box::pin(async move {
            match tokio::time::timeout(self.connect_timeout, self.open()).await {
                Ok(result) => result,
                Err(_) => Err(FeedError::ConnectTimeout {
                    host: self.host.clone(),
                    port: self.port,
                    timeout: self.connect_timeout,
                }),
            }
        })
    }

    fn endpoint(&self) -> String {
        let scheme = if self.tls.is_some() { "tls" } else { "tcp" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Build the rustls client configuration for the feed.
fn tls_client_config(config: &FeedConfig) -> Result<ClientConfig, FeedError> {
    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    if let Some(ca_file) = &config.ca_file {
        let certs = CertificateDer::pem_file_iter(ca_file)
            .map_err(|e| FeedError::Tls(format!("cannot read {}: {}", ca_file.display(), e)))?;
        for cert in certs {
            let cert = cert
                .map_err(|e| FeedError::Tls(format!("bad PEM in {}: {}", ca_file.display(), e)))?;
            roots
                .add(cert)
                .map_err(|e| FeedError::Tls(format!("rejected CA certificate: {}", e)))?;
        }
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let client_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| FeedError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(client_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_endpoint() {
        let config = FeedConfig {
            host: "127.0.0.1".to_string(),
            port: 4000,
            tls: false,
            ..Default::default()
        };
        let connector = TcpConnector::from_config(&config).unwrap();
        assert_eq!(connector.endpoint(), "tcp://127.0.0.1:4000");
    }

    #[test]
    fn test_tls_endpoint_uses_web_roots() {
        let connector = TcpConnector::from_config(&FeedConfig::default()).unwrap();
        assert!(connector.endpoint().starts_with("tls://"));
    }

    #[test]
    fn test_missing_ca_file_fails_early() {
        let config = FeedConfig {
            ca_file: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        assert!(matches!(
            TcpConnector::from_config(&config),
            Err(FeedError::Tls(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = FeedConfig {
            host: "127.0.0.1".to_string(),
            port,
            tls: false,
            ..Default::default()
        };
        let connector = TcpConnector::from_config(&config).unwrap();
        let result = connector.connect().await;
        assert!(matches!(result, Err(FeedError::Connect { .. })));
    }
}
