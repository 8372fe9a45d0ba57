//! Huddle signaling server.

mod config;
mod debug;
mod http;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use huddle_engine::EngineHandle;
use ws::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    let engine = EngineHandle::new(config.engine_config());

    if config.debug_traffic() {
        tokio::spawn(debug::report_traffic(engine.clone()));
    }

    let state = Arc::new(AppState {
        engine,
        admission_token: config.admission_token(),
        host_app_zip: config.host_app_zip.clone(),
    });
    let app = http::router(state, &config.cors_origin_list());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "huddle-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
