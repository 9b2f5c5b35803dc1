//! Parse command - classify raw feed lines.
//!
//! Reads a capture of the upstream feed (or stdin) and reports how each line
//! is understood. Useful when the upstream format drifts.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use flightstream::feed::{parse_line, ControlMessage, FeedMessage};

use crate::error::CliError;

/// Line counts per message kind.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParseSummary {
    pub positions: usize,
    pub identities: usize,
    pub control: usize,
    pub unrecognized: usize,
}

/// Run the parse command.
pub fn run(file: Option<PathBuf>, verbose: bool) -> Result<(), CliError> {
    let summary = match &file {
        Some(path) => {
            let input = File::open(path).map_err(|error| CliError::Input {
                path: path.display().to_string(),
                error,
            })?;
            classify(BufReader::new(input), verbose)
        }
        None => classify(io::stdin().lock(), verbose),
    }
    .map_err(|error| CliError::Input {
        path: file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<stdin>".to_string()),
        error,
    })?;

    println!();
    println!("Positions:    {}", summary.positions);
    println!("Identities:   {}", summary.identities);
    println!("Control:      {}", summary.control);
    println!("Unrecognized: {}", summary.unrecognized);
    Ok(())
}

/// Classify every line of `input`, printing unrecognized lines (and all
/// lines when `verbose`).
pub fn classify<R: BufRead>(input: R, verbose: bool) -> io::Result<ParseSummary> {
    let mut summary = ParseSummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let number = index + 1;

        match parse_line(&line) {
            FeedMessage::Position(update) => {
                summary.positions += 1;
                if verbose {
                    println!(
                        "{:>6}  position  {} {:.4},{:.4} alt={} hdg={}",
                        number,
                        update.id,
                        update.latitude,
                        update.longitude,
                        update.altitude_ft,
                        update.heading_deg
                    );
                }
            }
            FeedMessage::Identity(update) => {
                summary.identities += 1;
                if verbose {
                    println!(
                        "{:>6}  identity  {} callsign={} {}->{}",
                        number,
                        update.id,
                        update.callsign,
                        update.origin.as_deref().unwrap_or("?"),
                        update.destination.as_deref().unwrap_or("?")
                    );
                }
            }
            FeedMessage::Control(control) => {
                summary.control += 1;
                if verbose {
                    let detail = match control {
                        ControlMessage::Auth(result) => format!("auth {:?}", result),
                        ControlMessage::Clock(payload) => format!("clock {}", payload),
                    };
                    println!("{:>6}  control   {}", number, detail);
                }
            }
            FeedMessage::Unrecognized(raw) => {
                summary.unrecognized += 1;
                println!("{:>6}  UNRECOGNIZED  {}", number, raw);
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_counts_each_kind() {
        let capture = "auth ok\n\
                       pos a1 40.0 -73.0 3500 90 200 A 1700000000 none\n\
                       \n\
                       flight a1 DAL123 KJFK KLAX\n\
                       pos X notanumber 10 20 30 T 123 none\n";

        let summary = classify(capture.as_bytes(), false).unwrap();

        assert_eq!(
            summary,
            ParseSummary {
                positions: 1,
                identities: 1,
                control: 1,
                unrecognized: 1,
            }
        );
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let result = run(Some(PathBuf::from("/nonexistent/capture.txt")), false);
        assert!(matches!(result, Err(CliError::Input { .. })));
    }
}
