//! tether server entry point.
//!
//! Boots the interception layer in front of the configured origin: load config,
//! open the cache database, install and activate the worker, then serve.
//! Logs go to stderr as JSON.

use std::sync::Arc;

use anyhow::Result;
use tether_client::{FetchClient, FetchConfig, Network};
use tether_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod http;
mod hydrate;
mod lifecycle;
mod offline;
mod router;
mod runtime;
mod template;
mod templates;
mod worker;

use runtime::{ClientRegistry, PersistedRegistration};
use worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, db = %config.db_path.display(), "starting tether");

    let db = CacheDb::open(&config.db_path).await?;
    let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig {
        user_agent: config.user_agent.clone(),
        max_bytes: config.max_bytes,
        timeout: config.timeout(),
        ..Default::default()
    })?);

    let clients = Arc::new(ClientRegistry::new());
    let registration = Arc::new(PersistedRegistration::new(db.clone()));
    let worker = Arc::new(Worker::new(&config, db.clone(), network.clone(), registration, clients.clone())?);

    // Install always skips waiting, so a successful install activates at once.
    match worker.install().await {
        Ok(context) => {
            if let Err(err) = worker.activate(context).await {
                tracing::error!(code = err.code(), "activation failed: {err}");
            }
        }
        Err(err) => tracing::warn!(code = err.code(), "install failed, serving from existing caches: {err}"),
    }

    let state = http::AppState::new(&config, worker, network, clients, db)?;
    http::serve(&config.listen_addr, state).await?;

    Ok(())
}
