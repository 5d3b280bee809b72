// SPDX-License-Identifier: Apache-2.0

//! Agent registry: the only durable state in the hub.
//!
//! Records are immutable snapshots held as `Arc<AgentRecord>`. A health
//! refresh builds a new record and swaps the Arc, so concurrent readers see
//! either the old or the new record, never a partial one. In-flight calls
//! keep working from the snapshot they resolved, even if the record is
//! deleted underneath them.

pub mod persist;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::HubError;
use crate::upstream::probe::AgentCard;

/// A declared agent skill, taken from the agent card at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: u64,
    /// Normalized absolute HTTP(S) endpoint, unique per registry.
    pub url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    /// Declared order preserved from the agent card.
    #[serde(default)]
    pub skills: Vec<Skill>,
    pub provider: Option<String>,
    pub documentation_url: Option<String>,
    /// Owner identity, immutable after creation.
    pub registered_by: String,
    pub registered_at_ms: u64,
    /// Advisory reachability flag, refreshed by probing. Not monotonic.
    pub is_healthy: bool,
    pub last_health_check_ms: Option<u64>,
}

/// Ordered agent store with optional JSON persistence.
pub struct Registry {
    agents: RwLock<IndexMap<u64, Arc<AgentRecord>>>,
    next_id: AtomicU64,
    data_file: Option<PathBuf>,
}

impl Registry {
    /// Open the registry, loading persisted records when `data_file` exists.
    pub fn open(data_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut map = IndexMap::new();
        let mut next_id = 1;
        if let Some(ref path) = data_file {
            if path.exists() {
                let persisted = persist::load(path)?;
                next_id = persisted.next_id.max(1);
                for record in persisted.agents {
                    map.insert(record.id, Arc::new(record));
                }
            }
        }
        Ok(Self { agents: RwLock::new(map), next_id: AtomicU64::new(next_id), data_file })
    }

    /// In-memory registry for embedding and tests.
    pub fn in_memory() -> Self {
        Self { agents: RwLock::new(IndexMap::new()), next_id: AtomicU64::new(1), data_file: None }
    }

    /// Register a new agent from a successfully probed URL.
    ///
    /// `url` must already be normalized. Rejects duplicates.
    pub async fn register(
        &self,
        url: String,
        card: AgentCard,
        registered_by: String,
    ) -> Result<Arc<AgentRecord>, HubError> {
        let mut agents = self.agents.write().await;
        if agents.values().any(|a| a.url == url) {
            return Err(HubError::Duplicate);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = crate::state::epoch_ms();
        let provider = card.provider_name();
        let record = Arc::new(AgentRecord {
            id,
            url,
            name: card.name,
            description: card.description,
            version: card.version,
            skills: card.skills,
            provider,
            documentation_url: card.documentation_url,
            registered_by,
            registered_at_ms: now,
            is_healthy: true,
            last_health_check_ms: Some(now),
        });
        agents.insert(id, Arc::clone(&record));
        self.persist(&agents);
        Ok(record)
    }

    /// List all agents in registration order.
    pub async fn list(&self) -> Vec<Arc<AgentRecord>> {
        self.agents.read().await.values().map(Arc::clone).collect()
    }

    pub async fn get(&self, id: u64) -> Option<Arc<AgentRecord>> {
        self.agents.read().await.get(&id).map(Arc::clone)
    }

    /// Whether a normalized URL is already registered.
    pub async fn contains_url(&self, url: &str) -> bool {
        self.agents.read().await.values().any(|a| a.url == url)
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Delete an agent. Only the owner or an operator may delete; the
    /// record stays put on a forbidden attempt.
    pub async fn delete(
        &self,
        id: u64,
        requester_id: &str,
        operator: bool,
    ) -> Result<Arc<AgentRecord>, HubError> {
        let mut agents = self.agents.write().await;
        let record = agents.get(&id).map(Arc::clone).ok_or(HubError::NotFound)?;
        if !operator && record.registered_by != requester_id {
            return Err(HubError::Forbidden);
        }
        // shift_remove keeps registration order for the survivors.
        agents.shift_remove(&id);
        self.persist(&agents);
        Ok(record)
    }

    /// Apply a probe result to a record: atomic whole-record replacement.
    ///
    /// Concurrent refreshes of the same record race last-write-wins, which
    /// is fine for an advisory flag. Returns the updated record, or `None`
    /// if the agent was deleted in the meantime.
    pub async fn set_health(&self, id: u64, healthy: bool) -> Option<Arc<AgentRecord>> {
        let mut agents = self.agents.write().await;
        let current = agents.get(&id)?;
        let mut updated = AgentRecord::clone(current);
        updated.is_healthy = healthy;
        updated.last_health_check_ms = Some(crate::state::epoch_ms());
        let updated = Arc::new(updated);
        agents.insert(id, Arc::clone(&updated));
        self.persist(&agents);
        Some(updated)
    }

    fn persist(&self, agents: &IndexMap<u64, Arc<AgentRecord>>) {
        let Some(ref path) = self.data_file else { return };
        let snapshot = persist::PersistedRegistry {
            next_id: self.next_id.load(Ordering::Relaxed),
            agents: agents.values().map(|a| AgentRecord::clone(a)).collect(),
        };
        if let Err(e) = persist::save(path, &snapshot) {
            tracing::warn!(path = %path.display(), err = %e, "failed to persist registry");
        }
    }
}

/// Normalize and validate a candidate agent URL.
///
/// Scheme and host are lowercased, trailing slashes stripped. Returns a
/// human-readable reason on rejection.
pub fn normalize_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| "URL must be absolute (http:// or https://)".to_owned())?;
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(format!("unsupported URL scheme: {scheme}"));
    }
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, Some(path)),
        None => (rest, None),
    };
    if authority.is_empty() {
        return Err("URL has no host".to_owned());
    }
    let authority = authority.to_ascii_lowercase();
    Ok(match path {
        Some(path) => format!("{scheme}://{authority}/{path}"),
        None => format!("{scheme}://{authority}"),
    })
}
