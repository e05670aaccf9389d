//! vaxbot binary entry point.

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use vaxbot::cli::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = Cli::parse().run().await {
        tracing::error!(category = ?e.category(), "{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
