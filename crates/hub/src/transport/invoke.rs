// SPDX-License-Identifier: Apache-2.0

//! Invocation handlers: synchronous test calls and the streaming relay.
//!
//! Both build a [`CredentialConfig`] from the caller's headers at entry and
//! drop it before the response body is produced — credentials are scoped to
//! the call on every exit path.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::credential::CredentialConfig;
use crate::error::HubError;
use crate::relay;
use crate::state::HubState;
use crate::upstream::client::AgentClient;

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub message: String,
}

/// `POST /api/agents/{id}/test` — single synchronous call to an agent.
pub async fn test_agent(
    State(s): State<Arc<HubState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> impl IntoResponse {
    let record = match s.registry.get(id).await {
        Some(r) => r,
        None => return HubError::NotFound.to_http_response("Agent not found").into_response(),
    };

    let credentials = CredentialConfig::from_headers(&headers);
    let client = AgentClient::new(record.url.clone());

    // `record` is a snapshot: a concurrent delete does not abort the call.
    match client.send_message(&req.message, &credentials, s.config.invoke_timeout()).await {
        Ok((response, duration)) => {
            let _ = s.registry.set_health(id, true).await;
            Json(serde_json::json!({
                "status": "success",
                "response": response,
                "duration_ms": duration.as_millis() as u64,
            }))
            .into_response()
        }
        Err(e) => {
            let _ = s.registry.set_health(id, false).await;
            tracing::warn!(agent_id = id, err = %e, "agent invocation failed");
            e.hub_error().to_http_response(e.to_string()).into_response()
        }
    }
}

/// `POST /api/agents/{id}/stream` — relay the agent's event stream.
///
/// The response is `text/event-stream`; upstream chunks are forwarded in
/// arrival order and the stream ends with exactly one terminal marker.
pub async fn stream_agent(
    State(s): State<Arc<HubState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> Response {
    let record = match s.registry.get(id).await {
        Some(r) => r,
        None => return HubError::NotFound.to_http_response("Agent not found").into_response(),
    };

    let credentials = CredentialConfig::from_headers(&headers);
    let client = AgentClient::new(record.url.clone());

    let handle = relay::start(&client, &req.message, &credentials, s.config.stream_timeout()).await;
    drop(credentials); // scoped to the handshake, not the stream lifetime

    let stream = ReceiverStream::new(handle.rx).map(Ok::<Bytes, Infallible>);
    sse_response(Body::from_stream(stream))
}

fn sse_response(body: Body) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    (headers, body).into_response()
}
