//! Main entry point for batchdiff CLI

use batchdiff::cli::Cli;
use batchdiff::commands::{execute, EXIT_FATAL};
use clap::Parser;

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging, RUST_LOG overrides the -v level
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    match execute(&cli) {
        Ok(summary) => std::process::exit(summary.exit_code()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_FATAL);
        }
    }
}
