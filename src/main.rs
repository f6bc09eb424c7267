//! SXG Witness Service
//!
//! Accepts claims that a piece of text appears in a page published as a
//! signed HTTP exchange, verifies the exchange, stores a witness for the
//! claim and hands it to an external zero-knowledge prover. Clients poll
//! for the proof by request id.

mod config;
mod dispatcher;
mod error;
mod request_id;
mod server;
mod service;
mod status;
mod store;
mod sxg;
mod types;
mod witness;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::service::ProofService;
use crate::status::{ExplorerLinkParser, StatusResolver};
use crate::store::JobStore;
use crate::sxg::HttpExchangeSource;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "witness.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dotenv::dotenv().ok();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting SXG witness service");

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config file {}: {}. Using environment variables.", args.config, e);
            Config::from_env()?
        }
    };
    info!("Configuration loaded successfully");

    let store = JobStore::new(&config.data_dir);
    store.init().await?;

    let prover = config.prover_settings()?;
    info!("Prover: {:?}", prover);

    let exchanges = HttpExchangeSource::new(Duration::from_secs(config.request_timeout_secs))?;
    let resolver = StatusResolver::new(
        store.clone(),
        Arc::new(ExplorerLinkParser::new(&config.explorer_base_url)),
    );
    let service = ProofService::new(
        Arc::new(exchanges),
        store.clone(),
        Dispatcher::new(prover, store),
        resolver,
    );

    let addr = config.socket_addr()?;
    info!("Listening on {}", addr);
    warp::serve(server::routes(Arc::new(service))).run(addr).await;

    Ok(())
}
