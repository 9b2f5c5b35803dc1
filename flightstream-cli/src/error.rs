//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use flightstream::config::ConfigFileError;
use flightstream::feed::FeedError;
use flightstream::PipelineError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Pipeline failed to start
    Startup(PipelineError),
    /// Failed to read input
    Input { path: String, error: std::io::Error },
    /// Signal handling failed
    Signal(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Startup(PipelineError::Server(_)) => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. Another process is using the listen port");
                eprintln!("  2. Ports below 1024 need elevated privileges");
                eprintln!("Change [server] listen in the config file or pass --listen.");
            }
            CliError::Startup(PipelineError::Feed(FeedError::Tls(_))) => {
                eprintln!();
                eprintln!("Check [feed] ca_file in the config file.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Startup(e) => write!(f, "Failed to start pipeline: {}", e),
            CliError::Input { path, error } => {
                write!(f, "Failed to read '{}': {}", path, error)
            }
            CliError::Signal(e) => write!(f, "Failed to listen for shutdown signal: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Startup(e) => Some(e),
            CliError::Input { error, .. } => Some(error),
            CliError::Signal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Startup(e)
    }
}
