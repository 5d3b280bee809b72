// SPDX-License-Identifier: Apache-2.0

//! Stream relay: forwards incrementally produced agent output to the
//! caller in strict arrival order with exactly one terminal marker.
//!
//! One [`StreamSession`] per streaming invocation. The relay is a
//! single-producer/single-consumer capacity-1 channel, so at most one chunk
//! is in flight per session and ordering is structural. Terminal states are
//! absorbing: a session that completed can never also error, which is what
//! guarantees the exactly-one-terminal-marker contract.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::credential::CredentialConfig;
use crate::upstream::client::{AgentClient, UpstreamError};

/// Stream session lifecycle. `Open` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Open = 0,
    Completed = 1,
    Errored = 2,
    Cancelled = 3,
}

fn state_from(raw: u8) -> SessionState {
    match raw {
        0 => SessionState::Open,
        1 => SessionState::Completed,
        2 => SessionState::Errored,
        _ => SessionState::Cancelled,
    }
}

/// One active streaming invocation.
pub struct StreamSession {
    state: AtomicU8,
    chunks_relayed: AtomicU64,
    cancel: CancellationToken,
}

impl StreamSession {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Open as u8),
            chunks_relayed: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        state_from(self.state.load(Ordering::Acquire))
    }

    pub fn chunks_relayed(&self) -> u64 {
        self.chunks_relayed.load(Ordering::Relaxed)
    }

    /// Cancellation signal propagated to the upstream connection.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Move from `Open` to a terminal state. Returns false if the session
    /// is already terminal; terminal states absorb.
    fn transition(&self, next: SessionState) -> bool {
        self.state
            .compare_exchange(
                SessionState::Open as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// A started relay: the session handle plus the ordered chunk receiver the
/// transport turns into a response body.
pub struct RelayHandle {
    pub session: Arc<StreamSession>,
    pub rx: mpsc::Receiver<Bytes>,
}

fn completed_frame() -> Bytes {
    Bytes::from_static(b"data: {\"type\": \"completed\"}\n\n")
}

fn error_frame(detail: &str, kind: &str, status: Option<u16>) -> Bytes {
    let mut body = serde_json::json!({ "error": detail, "type": kind });
    if let Some(status) = status {
        body["status_code"] = status.into();
    }
    Bytes::from(format!("data: {body}\n\n"))
}

fn open_error_frame(err: &UpstreamError) -> Bytes {
    match err {
        UpstreamError::Timeout => error_frame("stream open timed out", "timeout", None),
        UpstreamError::Unreachable(detail) => error_frame(detail, "connection_error", None),
        UpstreamError::Agent { status, detail } => {
            error_frame(detail, "agent_error", *status)
        }
    }
}

/// Open the upstream stream and start relaying.
///
/// On open failure the session goes directly to `Errored` and the receiver
/// yields exactly one error frame. Credentials are consumed by the
/// handshake and do not outlive this call.
pub async fn start(
    client: &AgentClient,
    text: &str,
    credentials: &CredentialConfig,
    timeout: Duration,
) -> RelayHandle {
    let session = Arc::new(StreamSession::new());
    // Capacity 1: at most one in-flight chunk write per session.
    let (tx, rx) = mpsc::channel::<Bytes>(1);

    match client.open_stream(text, credentials, timeout).await {
        Ok(resp) => {
            let task_session = Arc::clone(&session);
            tokio::spawn(async move {
                relay_chunks(resp, tx, task_session).await;
            });
        }
        Err(e) => {
            session.transition(SessionState::Errored);
            // Channel is empty and has capacity, so this cannot fail.
            let _ = tx.try_send(open_error_frame(&e));
        }
    }

    RelayHandle { session, rx }
}

/// Pump upstream chunks to the caller until a terminal condition.
///
/// Dropping `resp`'s byte stream on exit is what actually releases the
/// upstream connection, so every break path below observably closes it.
async fn relay_chunks(
    resp: reqwest::Response,
    tx: mpsc::Sender<Bytes>,
    session: Arc<StreamSession>,
) {
    let mut stream = resp.bytes_stream();

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => {
                session.transition(SessionState::Cancelled);
                break;
            }
            next = stream.next() => match next {
                Some(Ok(chunk)) => {
                    // The send can block on a slow caller, so it must stay
                    // cancellable too.
                    let sent = tokio::select! {
                        _ = session.cancel.cancelled() => {
                            session.transition(SessionState::Cancelled);
                            break;
                        }
                        sent = tx.send(chunk) => sent,
                    };
                    if sent.is_err() {
                        // Caller disconnected: stop promptly, emit nothing more.
                        session.transition(SessionState::Cancelled);
                        session.cancel.cancel();
                        break;
                    }
                    session.chunks_relayed.fetch_add(1, Ordering::Relaxed);
                }
                Some(Err(e)) => {
                    if session.transition(SessionState::Errored) {
                        let kind = if e.is_timeout() { "timeout" } else { "stream_error" };
                        let _ = tx.send(error_frame(&e.to_string(), kind, None)).await;
                    }
                    break;
                }
                None => {
                    if session.transition(SessionState::Completed) {
                        let _ = tx.send(completed_frame()).await;
                    }
                    break;
                }
            }
        }
    }
}
