use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use googolplex_daemon::{
    BUS_NAME, Config, Dispatcher, DylibLoader, Engine, OBJECT_PATH, PluginRegistry, SearchClient,
    logging,
};
use tracing::{info, warn};
use zbus::ConnectionBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();
    logging::init(&config.log)?;

    let plugin_dir = config.plugin_dir();
    info!(dir = ?plugin_dir, "daemon starting up");
    if !plugin_dir.is_dir() {
        warn!(dir = ?plugin_dir, "plugin directory does not exist, every query will use web search");
    }

    let check_interval = config.check_interval();
    let registry = tokio::task::spawn_blocking(move || {
        PluginRegistry::for_directory(plugin_dir, Arc::new(DylibLoader::new()), check_interval)
    })
    .await
    .context("initial responder load panicked")?;

    if registry.is_empty() {
        warn!("no responders loaded, every query will use web search");
    }

    let search = SearchClient::new(config.search_settings())
        .context("failed to build search backend client")?;
    info!(url = search.base_url(), "fallback search backend configured");

    let engine = Engine::new(
        Arc::new(Dispatcher::new(Arc::new(registry))),
        Arc::new(search),
    );

    let _conn = ConnectionBuilder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, engine)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    info!(name = BUS_NAME, path = OBJECT_PATH, "googolplex engine is running");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    Ok(())
}
