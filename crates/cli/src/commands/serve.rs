//! `taor serve`: the stdio protocol server.
//!
//! Stdout carries protocol lines only; logs go to stderr.

use std::sync::Arc;

use taor_config::AppConfig;
use taor_server::{FileSessionStore, StdioServer};
use taor_tools::ResultStore;
use tracing::info;

use super::setup::{ConfiguredFactory, pricing_table, tool_registry};
use crate::BackendArgs;

pub async fn run(config: AppConfig, backend: BackendArgs) -> anyhow::Result<()> {
    let factory = ConfiguredFactory::from_env(config.clone()).with_model(backend.model.clone());
    // Fail before reading any input when no backend could ever be built.
    let default_provider = factory.select(backend.provider.as_deref())?;

    let store = Arc::new(ResultStore::new());
    let tools = Arc::new(tool_registry(store.clone())?);
    let sessions = Arc::new(FileSessionStore::new(config.sessions_dir()));
    info!(
        provider = %default_provider,
        sessions = %sessions.dir().display(),
        tools = tools.len(),
        "Starting stdio server"
    );

    StdioServer::new(Arc::new(factory), tools, store, sessions)
        .with_pricing(Arc::new(pricing_table(&config)))
        .with_settings(config.agent.clone())
        .with_default_provider(default_provider)
        .run_stdio()
        .await?;
    Ok(())
}
