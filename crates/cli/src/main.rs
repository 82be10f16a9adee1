//! Vigil CLI - Main entry point

use clap::Parser;
use std::process;
use vigil_cli::utils::print_error;
use vigil_cli::{run_cli, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        print_error(&e.to_string());
        process::exit(1);
    }
}
