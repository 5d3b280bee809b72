// SPDX-License-Identifier: Apache-2.0

//! Agent Hub: A2A agent registry with a credential-scoped invocation and
//! streaming proxy.
//!
//! Callers register agents by URL, then invoke or stream them using their
//! own provider keys supplied as per-request headers. The hub never
//! persists credential material; it only keeps the registry.

pub mod config;
pub mod credential;
pub mod error;
pub mod registry;
pub mod relay;
pub mod state;
pub mod transport;
pub mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::registry::Registry;
use crate::state::HubState;
use crate::transport::build_router;
use crate::upstream::health::spawn_health_refresher;

/// Run the hub server until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let registry = Registry::open(config.data_file.clone())?;
    let agent_count = registry.len().await;
    let state = Arc::new(HubState::new(config, registry, shutdown.clone()));

    if agent_count > 0 {
        tracing::info!(agent_count, "loaded persisted registry");
    }
    tracing::info!("agent hub listening on {addr}");

    spawn_health_refresher(Arc::clone(&state));

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
