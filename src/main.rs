//! Fairline server binary.

use clap::Parser;
use fairline::games::types::BetRecord;
use fairline::{api::ApiServer, BetFeed, ConfigLoader, SeedRegistry, Store, WagerEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fairline", about = "Provably-fair wager transaction engine", version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the RocksDB data directory.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fairline=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(host) = args.host {
        config.server.listen_address = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    info!(data_dir = %config.storage.data_dir, "opening store");
    let store = Store::open(&config.storage.data_dir)?;
    let seeds = SeedRegistry::new(store.clone());

    let feed = Arc::new(BetFeed::new(config.feed.clone()));
    let mut history: Vec<BetRecord> = store.recent_bets(config.feed.backlog)?;
    history.reverse(); // preload oldest first so backlogs end newest
    info!(records = history.len(), "preloading feed backlog");
    feed.preload(history);

    let engine = Arc::new(WagerEngine::new(
        store,
        seeds,
        feed.clone(),
        config.wager.clone(),
    ));

    ApiServer::new(config, engine, feed).run().await
}
