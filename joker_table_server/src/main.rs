mod admin;
mod config;
mod error;
mod service;
mod services;
mod store;
mod ws;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::service::TableService;
use crate::services::{JsonCatalogSource, MemoryBalanceStore, StaticRewardSettings};
use crate::ws::SharedState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load()?;
    let service = TableService::new(
        config.clone(),
        Arc::new(MemoryBalanceStore::new(config.starting_balance)),
        Arc::new(StaticRewardSettings::new(config.rewards.clone())),
        Arc::new(JsonCatalogSource::new(config.catalog_path.clone())),
    )
    .await
    .context("无法载入卡牌目录")?;
    let state = SharedState::new(service);

    let app = Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/admin/balance/{player_id}", post(admin::adjust_balance))
        .route("/admin/catalog/refresh", post(admin::refresh_catalog))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("无法监听 {}", config.bind_addr))?;
    info!("服务器正在监听 {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
