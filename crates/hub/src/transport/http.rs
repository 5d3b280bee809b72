// SPDX-License-Identifier: Apache-2.0

//! HTTP handlers for the agent registry.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::registry::{normalize_url, AgentRecord, Skill};
use crate::state::HubState;
use crate::transport::auth;
use crate::upstream::client::AGENT_CARD_PATH;
use crate::upstream::probe;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub url: String,
}

/// Caller-facing agent view. Display metadata gets placeholder text here,
/// at the read edge; the stored record keeps the raw optionals.
#[derive(Debug, Serialize)]
pub struct AgentView {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub skills: Vec<Skill>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    pub registered_by: String,
    pub registered_at_ms: u64,
    pub is_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check_ms: Option<u64>,
}

impl From<&AgentRecord> for AgentView {
    fn from(record: &AgentRecord) -> Self {
        Self {
            id: record.id,
            url: record.url.clone(),
            name: record.name.clone().unwrap_or_else(|| "Unnamed Agent".to_owned()),
            description: record
                .description
                .clone()
                .unwrap_or_else(|| "No description provided".to_owned()),
            version: record.version.clone().unwrap_or_else(|| "unknown".to_owned()),
            skills: record.skills.clone(),
            provider: record.provider.clone(),
            documentation_url: record.documentation_url.clone(),
            registered_by: record.registered_by.clone(),
            registered_at_ms: record.registered_at_ms,
            is_healthy: record.is_healthy,
            last_health_check_ms: record.last_health_check_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthProbeResponse {
    pub status: String,
    pub url: String,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let agent_count = s.registry.len().await;
    Json(HealthResponse { status: "running".to_owned(), agent_count })
}

/// `GET /api/agents` — list all registered agents in registration order.
pub async fn list_agents(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let records = s.registry.list().await;
    let views: Vec<AgentView> = records.iter().map(|r| AgentView::from(r.as_ref())).collect();
    Json(views)
}

/// `POST /api/agents` — register a new agent by URL.
///
/// The URL must pass a discovery probe; its card pre-populates the display
/// metadata.
pub async fn register_agent(
    State(s): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let requester = auth::requester(&headers, &s.config);

    let url = match normalize_url(&req.url) {
        Ok(url) => url,
        Err(reason) => return HubError::BadRequest.to_http_response(reason).into_response(),
    };

    if s.registry.contains_url(&url).await {
        return HubError::Duplicate.to_http_response("Agent already registered").into_response();
    }

    let outcome = probe::probe(&url, s.config.probe_timeout()).await;
    let Some(card) = outcome.card else {
        tracing::warn!(url = %url, "agent card probe failed during registration");
        return HubError::Unreachable
            .to_http_response(format!("Failed to fetch agent card from {url}{AGENT_CARD_PATH}"))
            .into_response();
    };

    match s.registry.register(url, card, requester.id).await {
        Ok(record) => {
            tracing::info!(agent_id = record.id, url = %record.url, "agent registered");
            Json(AgentView::from(record.as_ref())).into_response()
        }
        // Lost a race with a concurrent registration of the same URL.
        Err(e) => e.to_http_response("Agent already registered").into_response(),
    }
}

/// `DELETE /api/agents/{id}` — delete an agent (owner or operator only).
pub async fn delete_agent(
    State(s): State<Arc<HubState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let requester = auth::requester(&headers, &s.config);
    match s.registry.delete(id, &requester.id, requester.operator).await {
        Ok(record) => {
            tracing::info!(agent_id = id, url = %record.url, "agent deleted");
            Json(DeleteResponse { status: "deleted".to_owned() }).into_response()
        }
        Err(HubError::Forbidden) => HubError::Forbidden
            .to_http_response("Not authorized to delete this agent")
            .into_response(),
        Err(e) => e.to_http_response("Agent not found").into_response(),
    }
}

/// `GET /api/agents/{id}/health` — re-probe an agent and refresh its flag.
pub async fn refresh_health(
    State(s): State<Arc<HubState>>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let record = match s.registry.get(id).await {
        Some(r) => r,
        None => return HubError::NotFound.to_http_response("Agent not found").into_response(),
    };

    let outcome = probe::probe(&record.url, s.config.probe_timeout()).await;
    let _ = s.registry.set_health(id, outcome.healthy).await;

    let status = if outcome.healthy { "healthy" } else { "unhealthy" };
    Json(HealthProbeResponse { status: status.to_owned(), url: record.url.clone() })
        .into_response()
}
