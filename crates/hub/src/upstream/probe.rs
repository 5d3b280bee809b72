// SPDX-License-Identifier: Apache-2.0

//! Reachability/capability probing against the agent card discovery path.
//!
//! An unhealthy agent is an expected steady state, so probe failure is
//! data (`healthy = false`), never an error.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::Skill;
use crate::upstream::client::AgentClient;

/// Declared agent metadata from `/.well-known/agent.json`.
///
/// Used only to pre-populate display fields at registration time; the
/// registry's record is authoritative afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCard {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default, rename = "documentationUrl")]
    pub documentation_url: Option<String>,
}

/// Agent cards in the wild carry `provider` either as a plain string or as
/// an object with an `organization` field. Accept both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Provider {
    Name(String),
    Organization {
        #[serde(default)]
        organization: Option<String>,
    },
}

impl AgentCard {
    pub fn provider_name(&self) -> Option<String> {
        match &self.provider {
            Some(Provider::Name(name)) => Some(name.clone()),
            Some(Provider::Organization { organization }) => organization.clone(),
            None => None,
        }
    }
}

/// Result of probing a candidate or registered agent URL.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub card: Option<AgentCard>,
}

/// Probe an agent URL within `timeout`.
///
/// Connect failure, timeout, non-2xx, and malformed card all yield
/// `healthy = false` with no metadata.
pub async fn probe(url: &str, timeout: Duration) -> ProbeOutcome {
    let client = AgentClient::new(url.to_owned());
    match client.fetch_card(timeout).await {
        Ok(card) => ProbeOutcome { healthy: true, card: Some(card) },
        Err(e) => {
            tracing::debug!(url, err = %e, "agent probe failed");
            ProbeOutcome { healthy: false, card: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_parses_full_shape() {
        let card: AgentCard = serde_json::from_value(serde_json::json!({
            "name": "Research Agent",
            "description": "Searches the web",
            "version": "1.2.0",
            "skills": [
                { "id": "search", "name": "Web Search", "description": "Tavily-backed" },
                { "id": "summarize", "name": "Summarize" }
            ],
            "provider": { "organization": "Example Corp" },
            "documentationUrl": "https://docs.example.com"
        }))
        .expect("parse card");

        assert_eq!(card.name.as_deref(), Some("Research Agent"));
        assert_eq!(card.skills.len(), 2);
        assert_eq!(card.skills[0].id.as_deref(), Some("search"));
        assert_eq!(card.provider_name().as_deref(), Some("Example Corp"));
        assert_eq!(card.documentation_url.as_deref(), Some("https://docs.example.com"));
    }

    #[test]
    fn card_accepts_string_provider_and_missing_fields() {
        let card: AgentCard =
            serde_json::from_value(serde_json::json!({ "provider": "Example Corp" }))
                .expect("parse card");
        assert_eq!(card.provider_name().as_deref(), Some("Example Corp"));
        assert!(card.name.is_none());
        assert!(card.skills.is_empty());
    }

    #[test]
    fn skills_preserve_declared_order() {
        let card: AgentCard = serde_json::from_value(serde_json::json!({
            "skills": [ { "id": "c" }, { "id": "a" }, { "id": "b" } ]
        }))
        .expect("parse card");
        let ids: Vec<&str> = card.skills.iter().filter_map(|s| s.id.as_deref()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
