use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ferry_state::{Poller, Store};
use ferry_transfer::{ConnectionPool, StatusFetcher};
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::cli::{App, Commands};
use crate::config::Config;

mod cli;
mod config;
mod driver;
mod retrieve;

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();
    init_tracing(app.json);

    let config = Config::load(&app.config, app.credentials.as_deref())?;
    match app.cmd {
        Commands::Run => serve(&config, true).await,
        Commands::Watch => serve(&config, false).await,
        Commands::Retrieve(arg) => retrieve::run(&config, &arg).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Poll replication status until interrupted, optionally uploading new
/// source objects alongside.
async fn serve(config: &Config, store_files: bool) -> Result<()> {
    let store = Store::load(&config.status_file)
        .with_context(|| format!("failed to load state from {}", config.status_file.display()))?;
    tracing::info!(records = store.len(), path = %config.status_file.display(), "state loaded");
    let store = Arc::new(Mutex::new(store));

    let pool = ConnectionPool::new();
    let fetcher = StatusFetcher::new(pool.clone(), &config.endpoint_url)?;
    let poller = Poller::new(Arc::clone(&store), Arc::new(fetcher), config.tick());
    let mut polling = tokio::spawn(poller.run());

    if store_files {
        let source = config.source.open()?;
        tokio::select! {
            stored = driver::store_files(&source, &pool, &config.endpoint_url, &store) => {
                let stored = stored?;
                tracing::info!(stored, "all source objects stored, still tracking replication");
            }
            joined = &mut polling => return polling_stopped(joined),
            _ = signal::ctrl_c() => return shutdown(&store, polling).await,
        }
    }

    tokio::select! {
        joined = &mut polling => polling_stopped(joined),
        _ = signal::ctrl_c() => shutdown(&store, polling).await,
    }
}

fn polling_stopped(joined: std::result::Result<ferry_state::Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined
        .context("polling task failed")?
        .context("replication tracking stopped")
}

/// Stop polling and write out records nobody committed yet. A pass in
/// flight is cancelled along with the polling task.
async fn shutdown(store: &Mutex<Store>, polling: JoinHandle<ferry_state::Result<()>>) -> Result<()> {
    tracing::info!("interrupted, shutting down");
    polling.abort();
    let _ = polling.await;

    let mut store = store.lock().await;
    if store.is_dirty() {
        store.commit().await.context("failed to write state on shutdown")?;
    }
    Ok(())
}
