// SPDX-License-Identifier: Apache-2.0

//! HTTP transport for the agent hub.

pub mod auth;
pub mod http;
pub mod invoke;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::HubState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        // Service health (no auth)
        .route("/api/health", get(http::health))
        // Registry
        .route("/api/agents", get(http::list_agents).post(http::register_agent))
        .route("/api/agents/{id}", delete(http::delete_agent))
        .route("/api/agents/{id}/health", get(http::refresh_health))
        // Invocation
        .route("/api/agents/{id}/test", post(invoke::test_agent))
        .route("/api/agents/{id}/stream", post(invoke::stream_agent))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
