// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::HubConfig;
use crate::error::{ErrorResponse, HubError};
use crate::state::HubState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), HubError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let token = bearer_token(headers).ok_or(HubError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(HubError::Unauthorized)
    }
}

/// Caller identity for ownership checks.
///
/// Session/login is out of scope here; the identity is whatever the
/// `X-Hub-User` header claims, falling back to "anonymous".
/// Operator rights come from a dedicated bearer token.
#[derive(Debug, Clone)]
pub struct Requester {
    pub id: String,
    pub operator: bool,
}

pub fn requester(headers: &HeaderMap, config: &HubConfig) -> Requester {
    let id = headers
        .get("x-hub-user")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_owned();
    let operator = match (&config.operator_token, bearer_token(headers)) {
        (Some(expected), Some(token)) => constant_time_eq(token, expected),
        _ => false,
    };
    Requester { id, operator }
}

/// Axum middleware that enforces Bearer token authentication.
///
/// Exempt: `/api/health`. The operator token is accepted wherever the
/// service token is.
pub async fn auth_layer(
    state: State<Arc<HubState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if req.uri().path() == "/api/health" {
        return next.run(req).await;
    }

    let service = validate_bearer(req.headers(), state.config.auth_token.as_deref());
    let operator = match state.config.operator_token.as_deref() {
        Some(tok) => validate_bearer(req.headers(), Some(tok)),
        None => Err(HubError::Unauthorized),
    };
    if service.is_err() && operator.is_err() {
        let body = ErrorResponse { detail: "not authenticated".to_owned() };
        return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    }

    next.run(req).await
}
