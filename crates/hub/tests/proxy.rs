// SPDX-License-Identifier: Apache-2.0

//! End-to-end proxy tests against real TCP mock agents.
//!
//! Each mock agent is an axum router served on an ephemeral loopback port,
//! so the hub's reqwest-based probe/invoke/relay paths are exercised for
//! real.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_test::TestServer;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use agenthub::config::HubConfig;
use agenthub::credential::CredentialConfig;
use agenthub::registry::Registry;
use agenthub::relay::{self, SessionState};
use agenthub::state::HubState;
use agenthub::transport::build_router;
use agenthub::upstream::client::AgentClient;
use agenthub::upstream::probe;

fn test_config() -> HubConfig {
    HubConfig {
        host: "127.0.0.1".into(),
        port: 0,
        auth_token: None,
        operator_token: None,
        probe_timeout_ms: 2000,
        invoke_timeout_ms: 5000,
        stream_timeout_ms: 10000,
        health_check_ms: 0,
        data_file: None,
    }
}

fn test_state() -> Arc<HubState> {
    Arc::new(HubState::new(test_config(), Registry::in_memory(), CancellationToken::new()))
}

fn hub_server(state: Arc<HubState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

/// Serve a mock agent router on an ephemeral loopback port.
async fn spawn_agent(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock agent");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

fn card_route(card: serde_json::Value) -> Router {
    Router::new().route(
        "/.well-known/agent.json",
        get(move || {
            let card = card.clone();
            async move { Json(card) }
        }),
    )
}

/// Mock agent that answers `message/send` by echoing the credential
/// headers it received.
fn echo_agent(card: serde_json::Value) -> Router {
    card_route(card).route(
        "/",
        post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
            let header = |name: &str| {
                headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
            };
            Json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "result": { "text": "pong" },
                "echo": {
                    "method": body["method"],
                    "openai_key": header("x-openai-api-key"),
                    "tavily_key": header("x-tavily-api-key"),
                    "unused": header("x-unused-header"),
                },
            }))
        }),
    )
}

// -- Registration probe --------------------------------------------------------

#[tokio::test]
async fn register_probes_card_and_populates_metadata() {
    let url = spawn_agent(card_route(serde_json::json!({
        "name": "Research Agent",
        "description": "Searches the web",
        "version": "1.2.0",
        "skills": [{ "id": "search", "name": "Web Search" }],
        "provider": { "organization": "Example Corp" }
    })))
    .await;

    let state = test_state();
    let server = hub_server(Arc::clone(&state));

    let resp = server
        .post("/api/agents")
        .add_header("x-hub-user", "alice")
        .json(&serde_json::json!({ "url": url }))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["name"], "Research Agent");
    assert_eq!(body["version"], "1.2.0");
    assert_eq!(body["provider"], "Example Corp");
    assert_eq!(body["skills"][0]["id"], "search");
    assert_eq!(body["registered_by"], "alice");
    assert_eq!(body["is_healthy"], true);

    let list: Vec<serde_json::Value> = server.get("/api/agents").await.json();
    assert_eq!(list.len(), 1);
}

#[tokio::test]
async fn refresh_health_tracks_agent_going_away() {
    let url = spawn_agent(card_route(serde_json::json!({ "name": "Flaky" }))).await;
    let state = test_state();
    let server = hub_server(Arc::clone(&state));

    let created: serde_json::Value =
        server.post("/api/agents").json(&serde_json::json!({ "url": url })).await.json();
    let id = created["id"].as_u64().expect("id");

    let resp = server.get(&format!("/api/agents/{id}/health")).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "healthy");

    // Point the record at a dead port by re-probing a registry whose agent
    // vanished: simulate by probing a closed port directly.
    let outcome = probe::probe("http://127.0.0.1:9", Duration::from_millis(500)).await;
    assert!(!outcome.healthy);
    state.registry.set_health(id, outcome.healthy).await;

    let record = state.registry.get(id).await.expect("record");
    assert!(!record.is_healthy);
}

#[tokio::test]
async fn probe_timeout_is_bounded() {
    // Non-routable address: connect hangs until the probe deadline.
    let started = Instant::now();
    let outcome = probe::probe("http://10.255.255.1:9", Duration::from_millis(300)).await;
    assert!(!outcome.healthy);
    assert!(outcome.card.is_none());
    assert!(started.elapsed() < Duration::from_secs(5), "probe did not respect its deadline");
}

// -- Invocation ---------------------------------------------------------------

#[tokio::test]
async fn invoke_forwards_credentials_exactly() {
    let url = spawn_agent(echo_agent(serde_json::json!({ "name": "Echo" }))).await;
    let state = test_state();
    let server = hub_server(Arc::clone(&state));

    let created: serde_json::Value =
        server.post("/api/agents").json(&serde_json::json!({ "url": url })).await.json();
    let id = created["id"].as_u64().expect("id");

    let resp = server
        .post(&format!("/api/agents/{id}/test"))
        .add_header("x-openai-api-key", "sk-1")
        .add_header("x-unused-header", "x")
        .json(&serde_json::json!({ "message": "ping" }))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["response"]["echo"]["method"], "message/send");
    assert_eq!(body["response"]["echo"]["openai_key"], "sk-1");
    // Entries absent from the credential config are not synthesized, and
    // unknown caller headers are dropped rather than forwarded.
    assert!(body["response"]["echo"]["tavily_key"].is_null());
    assert!(body["response"]["echo"]["unused"].is_null());
    assert!(body["duration_ms"].as_u64().is_some());
}

#[tokio::test]
async fn invoke_deleted_mid_flight_completes_from_snapshot() {
    let card = serde_json::json!({ "name": "Slow" });
    let slow_agent = card_route(card).route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Json(serde_json::json!({ "result": "done" }))
        }),
    );
    let url = spawn_agent(slow_agent).await;

    let state = test_state();
    let server = hub_server(Arc::clone(&state));
    let created: serde_json::Value = server
        .post("/api/agents")
        .add_header("x-hub-user", "alice")
        .json(&serde_json::json!({ "url": url }))
        .await
        .json();
    let id = created["id"].as_u64().expect("id");

    let call = server.post(&format!("/api/agents/{id}/test")).json(&serde_json::json!({
        "message": "ping"
    }));
    let delete = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        state.registry.delete(id, "alice", false).await.expect("delete mid-flight");
    };

    let (resp, ()) = tokio::join!(call, delete);
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "success");
    assert!(state.registry.get(id).await.is_none());
}

#[tokio::test]
async fn invoke_agent_failure_returns_502_with_detail() {
    let failing = card_route(serde_json::json!({ "name": "Broken" })).route(
        "/",
        post(|| async {
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "agent exploded").into_response()
        }),
    );
    let url = spawn_agent(failing).await;

    let state = test_state();
    let server = hub_server(Arc::clone(&state));
    let created: serde_json::Value =
        server.post("/api/agents").json(&serde_json::json!({ "url": url })).await.json();
    let id = created["id"].as_u64().expect("id");

    let resp = server
        .post(&format!("/api/agents/{id}/test"))
        .json(&serde_json::json!({ "message": "ping" }))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = resp.json();
    assert!(body["detail"].as_str().unwrap_or_default().contains("agent exploded"));

    // Invocation failure flips the advisory health flag.
    let record = state.registry.get(id).await.expect("record");
    assert!(!record.is_healthy);
}

#[tokio::test]
async fn invoke_malformed_body_returns_502() {
    let garbled = card_route(serde_json::json!({ "name": "Garbled" }))
        .route("/", post(|| async { "this is not json" }));
    let url = spawn_agent(garbled).await;

    let state = test_state();
    let server = hub_server(Arc::clone(&state));
    let created: serde_json::Value =
        server.post("/api/agents").json(&serde_json::json!({ "url": url })).await.json();
    let id = created["id"].as_u64().expect("id");

    let resp = server
        .post(&format!("/api/agents/{id}/test"))
        .json(&serde_json::json!({ "message": "ping" }))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = resp.json();
    assert!(body["detail"].as_str().unwrap_or_default().contains("malformed"));
}

#[tokio::test]
async fn invoke_timeout_returns_504() {
    let card = serde_json::json!({ "name": "Stuck" });
    let stuck = card_route(card).route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(serde_json::json!({}))
        }),
    );
    let url = spawn_agent(stuck).await;

    let state = {
        let mut config = test_config();
        config.invoke_timeout_ms = 200;
        Arc::new(HubState::new(config, Registry::in_memory(), CancellationToken::new()))
    };
    let server = hub_server(Arc::clone(&state));
    let created: serde_json::Value =
        server.post("/api/agents").json(&serde_json::json!({ "url": url })).await.json();
    let id = created["id"].as_u64().expect("id");

    let resp = server
        .post(&format!("/api/agents/{id}/test"))
        .json(&serde_json::json!({ "message": "ping" }))
        .await;
    resp.assert_status(axum::http::StatusCode::GATEWAY_TIMEOUT);
}

// -- Stream relay -------------------------------------------------------------

#[tokio::test]
async fn stream_relays_chunks_in_order_with_one_terminal_marker() {
    let chunks = ["data: a\n\n", "data: b\n\n", "data: c\n\n"];
    let streaming = card_route(serde_json::json!({ "name": "Streamer" })).route(
        "/",
        post(move || async move {
            let parts = chunks
                .into_iter()
                .map(|c| Ok::<Bytes, Infallible>(Bytes::from_static(c.as_bytes())));
            Body::from_stream(futures_util::stream::iter(parts)).into_response()
        }),
    );
    let url = spawn_agent(streaming).await;

    let state = test_state();
    let server = hub_server(Arc::clone(&state));
    let created: serde_json::Value =
        server.post("/api/agents").json(&serde_json::json!({ "url": url })).await.json();
    let id = created["id"].as_u64().expect("id");

    let resp = server
        .post(&format!("/api/agents/{id}/stream"))
        .json(&serde_json::json!({ "message": "go" }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.header("content-type"), "text/event-stream");

    let text = resp.text();
    let a = text.find("data: a").expect("chunk a");
    let b = text.find("data: b").expect("chunk b");
    let c = text.find("data: c").expect("chunk c");
    let done = text.find(r#"data: {"type": "completed"}"#).expect("terminal marker");
    assert!(a < b && b < c && c < done, "chunks out of order: {text}");
    assert_eq!(text.matches(r#"{"type": "completed"}"#).count(), 1);
}

#[tokio::test]
async fn stream_open_failure_delivers_single_error_frame() {
    let refusing = card_route(serde_json::json!({ "name": "Refuser" })).route(
        "/",
        post(|| async {
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, "agent busy").into_response()
        }),
    );
    let url = spawn_agent(refusing).await;

    let state = test_state();
    let server = hub_server(Arc::clone(&state));
    let created: serde_json::Value =
        server.post("/api/agents").json(&serde_json::json!({ "url": url })).await.json();
    let id = created["id"].as_u64().expect("id");

    let resp = server
        .post(&format!("/api/agents/{id}/stream"))
        .json(&serde_json::json!({ "message": "go" }))
        .await;
    // The relay surfaces open failures in-band as a single error frame.
    resp.assert_status_ok();
    let text = resp.text();
    assert_eq!(text.matches("data: ").count(), 1, "expected exactly one frame: {text}");
    assert!(text.contains("agent busy"));
    assert!(text.contains("agent_error"));
}

/// Infinite upstream stream whose drop is observable through a flag.
fn endless_agent(released: Arc<AtomicBool>) -> Router {
    card_route(serde_json::json!({ "name": "Endless" })).route(
        "/",
        post(move || {
            let released = Arc::clone(&released);
            async move {
                struct ReleaseGuard(Arc<AtomicBool>);
                impl Drop for ReleaseGuard {
                    fn drop(&mut self) {
                        self.0.store(true, Ordering::SeqCst);
                    }
                }

                let guard = ReleaseGuard(released);
                let stream = futures_util::stream::unfold((guard, 0u64), |(guard, i)| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let chunk = Bytes::from(format!("data: chunk{i}\n\n"));
                    Some((Ok::<Bytes, Infallible>(chunk), (guard, i + 1)))
                });
                Body::from_stream(stream).into_response()
            }
        }),
    )
}

/// Wait for the mock upstream's body to actually be dropped.
async fn wait_released(flag: &AtomicBool) {
    for _ in 0..200 {
        if flag.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(flag.load(Ordering::SeqCst), "upstream connection was not released");
}

#[tokio::test]
async fn caller_disconnect_cancels_and_releases_upstream() {
    let released = Arc::new(AtomicBool::new(false));
    let url = spawn_agent(endless_agent(Arc::clone(&released))).await;

    let client = AgentClient::new(url);
    let credentials = CredentialConfig::from_headers(&HeaderMap::new());
    let mut handle =
        relay::start(&client, "go", &credentials, Duration::from_secs(30)).await;
    assert_eq!(handle.session.state(), SessionState::Open);

    // Receive one chunk, then walk away like a disconnecting caller.
    let first = handle.rx.recv().await.expect("first chunk");
    assert!(std::str::from_utf8(&first).expect("utf8").contains("chunk0"));
    let session = Arc::clone(&handle.session);
    drop(handle);

    // The upstream body must actually be dropped, not merely unread.
    wait_released(&released).await;
    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(session.chunks_relayed() >= 1);
}

#[tokio::test]
async fn explicit_cancel_releases_upstream() {
    let released = Arc::new(AtomicBool::new(false));
    let url = spawn_agent(endless_agent(Arc::clone(&released))).await;

    let client = AgentClient::new(url);
    let credentials = CredentialConfig::from_headers(&HeaderMap::new());
    let handle = relay::start(&client, "go", &credentials, Duration::from_secs(30)).await;

    handle.session.cancel_token().cancel();
    wait_released(&released).await;
    assert_eq!(handle.session.state(), SessionState::Cancelled);
}
