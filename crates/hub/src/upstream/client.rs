// SPDX-License-Identifier: Apache-2.0

//! HTTP client for communicating with a single registered agent.
//!
//! One outbound call per operation, no retries: a remote agent call may be
//! billed or stateful, so retry policy belongs to the caller.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::json;

use crate::credential::{CredentialConfig, DeliverCredentials, HeaderDelivery};
use crate::error::HubError;
use crate::upstream::probe::AgentCard;

/// Well-known discovery path for A2A agent cards.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

/// Classified failure of an outbound agent call.
#[derive(Debug)]
pub enum UpstreamError {
    /// Deadline exceeded.
    Timeout,
    /// Connect/DNS failure before any response arrived.
    Unreachable(String),
    /// The agent answered with a failure status or a malformed body.
    /// `detail` carries the upstream status/message verbatim for display.
    Agent { status: Option<u16>, detail: String },
}

impl UpstreamError {
    /// Map to the API error taxonomy.
    pub fn hub_error(&self) -> HubError {
        match self {
            Self::Timeout => HubError::Timeout,
            Self::Unreachable(_) => HubError::Unreachable,
            Self::Agent { .. } => HubError::AgentError,
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("agent call timed out"),
            Self::Unreachable(detail) => write!(f, "agent unreachable: {detail}"),
            Self::Agent { status: Some(status), detail } => {
                write!(f, "agent error (status {status}): {detail}")
            }
            Self::Agent { status: None, detail } => write!(f, "agent error: {detail}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

fn classify(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        // reqwest::Error Display includes URLs but never request headers,
        // so credential material cannot leak through the detail text.
        UpstreamError::Unreachable(err.to_string())
    }
}

/// Build the JSON-RPC envelope for an A2A message call.
pub fn a2a_envelope(method: &str, request_id: &str, text: &str) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "method": method,
        "params": {
            "message": {
                "messageId": uuid::Uuid::new_v4().to_string(),
                "role": "user",
                "parts": [{ "type": "text", "text": text }],
            }
        },
    })
}

/// HTTP client wrapper for one agent endpoint.
pub struct AgentClient {
    base_url: String,
    client: Client,
    delivery: Box<dyn DeliverCredentials>,
}

impl AgentClient {
    pub fn new(base_url: String) -> Self {
        Self::with_delivery(base_url, Box::new(HeaderDelivery))
    }

    /// Use a non-default credential delivery strategy.
    pub fn with_delivery(base_url: String, delivery: Box<dyn DeliverCredentials>) -> Self {
        let client = Client::builder().build().unwrap_or_default();
        Self { base_url, client, delivery }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the agent card from the well-known discovery path.
    pub async fn fetch_card(&self, timeout: Duration) -> Result<AgentCard, UpstreamError> {
        let resp = self
            .client
            .get(self.url(AGENT_CARD_PATH))
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Agent { status: Some(status.as_u16()), detail });
        }
        resp.json().await.map_err(|e| UpstreamError::Agent {
            status: Some(status.as_u16()),
            detail: format!("malformed agent card: {e}"),
        })
    }

    /// Send one synchronous A2A message and return the raw response value
    /// plus the measured call duration.
    ///
    /// Every non-empty credential entry is delivered to the call; nothing
    /// is synthesized for absent entries.
    pub async fn send_message(
        &self,
        text: &str,
        credentials: &CredentialConfig,
        timeout: Duration,
    ) -> Result<(serde_json::Value, Duration), UpstreamError> {
        let payload = a2a_envelope("message/send", "test-1", text);
        let req = self.client.post(&self.base_url).json(&payload).timeout(timeout);
        let req = self.delivery.deliver(credentials, req);

        let started = Instant::now();
        let resp = req.send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Agent { status: Some(status.as_u16()), detail });
        }
        let value: serde_json::Value = resp.json().await.map_err(|e| UpstreamError::Agent {
            status: Some(status.as_u16()),
            detail: format!("malformed response body: {e}"),
        })?;
        Ok((value, started.elapsed()))
    }

    /// Open a streaming A2A call. The returned response's byte stream is
    /// owned by the relay; credentials are consumed here and do not outlive
    /// the handshake.
    pub async fn open_stream(
        &self,
        text: &str,
        credentials: &CredentialConfig,
        timeout: Duration,
    ) -> Result<reqwest::Response, UpstreamError> {
        let payload = a2a_envelope("message/stream", "stream-1", text);
        let req = self
            .client
            .post(&self.base_url)
            .header("accept", "text/event-stream")
            .json(&payload)
            .timeout(timeout);
        let req = self.delivery.deliver(credentials, req);

        let resp = req.send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Agent { status: Some(status.as_u16()), detail });
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_matches_a2a_shape() {
        let payload = a2a_envelope("message/send", "test-1", "hello");
        assert_eq!(payload["jsonrpc"], "2.0");
        assert_eq!(payload["id"], "test-1");
        assert_eq!(payload["method"], "message/send");
        assert_eq!(payload["params"]["message"]["role"], "user");
        assert_eq!(payload["params"]["message"]["parts"][0]["text"], "hello");
        assert!(payload["params"]["message"]["messageId"].is_string());
    }

    #[test]
    fn envelopes_get_fresh_message_ids() {
        let a = a2a_envelope("message/send", "test-1", "x");
        let b = a2a_envelope("message/send", "test-1", "x");
        assert_ne!(
            a["params"]["message"]["messageId"],
            b["params"]["message"]["messageId"]
        );
    }

    #[test]
    fn upstream_error_maps_to_taxonomy() {
        assert_eq!(UpstreamError::Timeout.hub_error(), HubError::Timeout);
        assert_eq!(
            UpstreamError::Unreachable("dns".into()).hub_error(),
            HubError::Unreachable
        );
        assert_eq!(
            UpstreamError::Agent { status: Some(500), detail: "boom".into() }.hub_error(),
            HubError::AgentError
        );
    }
}
