use std::sync::Arc;

use anyhow::{Context, Result};
use chat_client::{bridge, config, ChatClient};
use chat_store::SqliteStore;
use clap::Parser;
use time::UtcOffset;
use tokio::io::BufReader;

fn main() -> Result<()> {
    // Must run before any other thread exists.
    let local_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let cli = config::Cli::parse();
    let cfg = config::Config::load(&cli, local_offset)?;
    let level = if cfg.logging_enabled {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cfg))
}

async fn run(cfg: config::Config) -> Result<()> {
    let store = SqliteStore::open(&cfg.db_path)
        .with_context(|| format!("failed to open {}", cfg.db_path.display()))?;
    let client = ChatClient::login(Arc::new(store), &cfg.user, cfg.settings)
        .await
        .with_context(|| format!("login as `{}` failed", cfg.user))?;
    bridge::run(
        client,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
