// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zk_record_gateway::{
    api::router,
    config::{AppConfig, LOG_FORMAT_ENV},
    state::AppState,
    sweeper::{Sweep, Sweeper},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let sweep_interval = config.sweep_interval;

    let state = AppState::from_config(config).map_err(|e| {
        error!(error = %e, "Startup failed");
        e
    })?;
    let restored = state.tokens.load();
    info!(restored, "Sharing tokens restored");

    let shutdown = CancellationToken::new();
    let resilience = state.pipeline.resilience();
    let targets: Vec<Arc<dyn Sweep>> = vec![
        resilience.rate_limiter().clone(),
        state.tokens.clone(),
        resilience.history().clone(),
    ];
    let sweeper = tokio::spawn(Sweeper::new(targets, sweep_interval).run(shutdown.clone()));

    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "ZK record gateway listening (docs at /docs)");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    sweeper.await?;
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_default();

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Cannot listen for ctrl-c; waiting for cancellation");
                shutdown.cancelled().await;
            }
        }
        _ = shutdown.cancelled() => {}
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
