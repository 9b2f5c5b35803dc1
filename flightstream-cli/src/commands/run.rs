//! Run command - start the live pipeline and serve until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

use flightstream::config::{config_file_path, ConfigFile};
use flightstream::feed::FeedState;
use flightstream::logging::init_logging;
use flightstream::{LivePipeline, PipelineConfig};

use crate::error::CliError;

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Configuration file (default: ~/.flightstream/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Subscriber listen address, e.g. 127.0.0.1:8080
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Upstream feed host
    #[arg(long)]
    pub feed_host: Option<String>,

    /// Upstream feed port
    #[arg(long)]
    pub feed_port: Option<u16>,

    /// Connect to the feed without TLS (local testing only)
    #[arg(long)]
    pub plaintext: bool,
}

impl RunArgs {
    /// Overlay command-line values onto the file configuration.
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(host) = &self.feed_host {
            config.feed.host = host.clone();
        }
        if let Some(port) = self.feed_port {
            config.feed.port = port;
        }
        if self.plaintext {
            config.feed.tls = false;
        }
    }
}

/// Run the live pipeline until Ctrl-C.
pub async fn run(args: RunArgs) -> Result<(), CliError> {
    let config_path = args.config.clone().unwrap_or_else(config_file_path);
    let file = ConfigFile::load_from(&config_path)?;

    let _logging_guard = init_logging(&file.logging.directory, &file.logging.file)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;
    info!("FlightStream v{}", flightstream::VERSION);
    info!(config = %config_path.display(), "Configuration loaded");

    let mut config = file.to_pipeline_config();
    args.apply(&mut config);

    if config.feed.username.is_empty() {
        warn!("No feed username configured; the upstream will likely reject the login");
    }

    let pipeline = LivePipeline::builder(config).start().await?;
    println!("Serving subscribers on ws://{}", pipeline.local_addr());
    println!("Press Ctrl+C to stop.");

    let mut feed_state = pipeline.feed_state();
    let interrupted = loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => break result,
            changed = feed_state.changed() => {
                if changed.is_err() {
                    // Ingestion task finished; keep serving cached flights.
                    break tokio::signal::ctrl_c().await;
                }
                let state = *feed_state.borrow_and_update();
                if state.is_terminal() && state != FeedState::Shutdown {
                    println!("Upstream feed stopped ({}); serving cached flights only.", state);
                }
            }
        }
    };

    pipeline.shutdown().await;
    interrupted.map_err(CliError::Signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = RunArgs {
            config: None,
            listen: Some("127.0.0.1:9100".parse().unwrap()),
            feed_host: Some("localhost".to_string()),
            feed_port: Some(4001),
            plaintext: true,
        };
        let mut config = PipelineConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.listen.port(), 9100);
        assert_eq!(config.feed.host, "localhost");
        assert_eq!(config.feed.port, 4001);
        assert!(!config.feed.tls);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = RunArgs {
            config: None,
            listen: None,
            feed_host: None,
            feed_port: None,
            plaintext: false,
        };
        let mut config = PipelineConfig::default();
        args.apply(&mut config);

        assert!(config.feed.tls);
        assert_eq!(config.feed.host, PipelineConfig::default().feed.host);
    }
}
