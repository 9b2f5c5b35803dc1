//! CLI command implementations.
//!
//! - [`init`] - Write a default configuration file
//! - [`parse`] - Classify feed lines from a capture file or stdin
//! - [`run`] - Run the live pipeline until interrupted

pub mod init;
pub mod parse;
pub mod run;
