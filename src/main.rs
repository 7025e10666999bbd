// src/main.rs
// tagstore - maintenance CLI for a per-guild tag store

use anyhow::Result;
use clap::Parser;
use tagstore::config::TagStoreConfig;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then working directory)
    let _ = dotenvy::from_path(TagStoreConfig::config_dir().join(".env"));
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("TAGSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = TagStoreConfig::load_with_env();
    cli::run(cli, config).await
}
