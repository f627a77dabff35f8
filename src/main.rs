//! # Chartsmith CLI
//!
//! This is the binary entry point for the `chartsmith` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Starting the async runtime and executing the selected command.
//! - Translating library errors into user-friendly output.
//!
//! The core logic lives in the `chartsmith` library crate; the binary is a
//! thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute().await
}
