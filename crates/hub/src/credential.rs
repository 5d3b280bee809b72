// SPDX-License-Identifier: Apache-2.0

//! Per-call credential scoping.
//!
//! Callers supply their own provider keys as request headers; each call
//! builds a transient [`CredentialConfig`] from them, hands it to the
//! outbound request, and drops it when the call returns. Nothing here is
//! persisted, cached, or logged.

use std::collections::HashMap;
use std::fmt;

use axum::http::HeaderMap;

/// Fixed header-name -> config-key table. Exhaustive: headers not listed
/// here are dropped, and a missing header simply omits its key.
pub const HEADER_KEYS: &[(&str, &str)] = &[
    ("x-openai-api-key", "OPENAI_API_KEY"),
    ("x-openai-model", "OPENAI_MODEL"),
    ("x-openai-base-url", "OPENAI_BASE_URL"),
    ("x-tavily-api-key", "TAVILY_API_KEY"),
    ("x-langfuse-secret-key", "LANGFUSE_SECRET_KEY"),
    ("x-langfuse-public-key", "LANGFUSE_PUBLIC_KEY"),
];

/// Ephemeral per-call map of provider key names to caller-supplied values.
#[derive(Clone, Default)]
pub struct CredentialConfig {
    entries: HashMap<String, String>,
}

impl CredentialConfig {
    /// Extract credentials from inbound request headers using [`HEADER_KEYS`].
    ///
    /// Pure: no side effects, no defaults invented for missing headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut entries = HashMap::new();
        for (header, key) in HEADER_KEYS {
            if let Some(value) = headers.get(*header).and_then(|v| v.to_str().ok()) {
                if !value.is_empty() {
                    entries.insert((*key).to_owned(), value.to_owned());
                }
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// Secrets must not leak through Debug formatting of requests or state.
// Only key names are shown.
impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("CredentialConfig").field("keys", &keys).finish()
    }
}

/// Strategy for delivering a [`CredentialConfig`] to the outbound agent call.
///
/// The on-the-wire channel is an external-protocol detail; this trait keeps
/// it pluggable. The contract: every non-empty entry reaches the remote
/// call, and absent entries are never synthesized from platform defaults.
pub trait DeliverCredentials: Send + Sync {
    fn deliver(
        &self,
        config: &CredentialConfig,
        req: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder;
}

/// Default delivery: config keys mapped back to their `X-*` request headers.
pub struct HeaderDelivery;

impl DeliverCredentials for HeaderDelivery {
    fn deliver(
        &self,
        config: &CredentialConfig,
        mut req: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        for (header, key) in HEADER_KEYS {
            if let Some(value) = config.get(key) {
                req = req.header(*header, value);
            }
        }
        req
    }
}
