use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::Args;
use commands::execute_command;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LAB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = execute_command(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
