//! FlightStream CLI - Command-line interface
//!
//! This binary runs the live flight pipeline and offers helpers for
//! configuration and feed debugging.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod error;

use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "flightstream")]
#[command(version, about = "Live flight ingestion and WebSocket fan-out", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the upstream feed and serve subscribers until Ctrl+C
    Run(RunArgs),

    /// Write a default configuration file
    Init {
        /// Configuration file to write (default: ~/.flightstream/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Classify feed lines from a capture file (or stdin)
    Parse {
        /// Capture file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Print every line, not only unrecognized ones
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Init { config, force } => commands::init::run(config, force),
        Commands::Parse { file, verbose } => commands::parse::run(file, verbose),
    };

    if let Err(e) = result {
        e.exit();
    }
}
