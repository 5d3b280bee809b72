// SPDX-License-Identifier: Apache-2.0

/// Configuration for the agent hub server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "agent-hub", about = "A2A agent registry and invocation proxy")]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "AGENT_HUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "AGENT_HUB_PORT")]
    pub port: u16,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "AGENT_HUB_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Bearer token granting operator rights (delete any agent).
    #[arg(long, env = "AGENT_HUB_OPERATOR_TOKEN")]
    pub operator_token: Option<String>,

    /// Agent-card probe timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "AGENT_HUB_PROBE_TIMEOUT_MS")]
    pub probe_timeout_ms: u64,

    /// Synchronous invocation timeout in milliseconds.
    #[arg(long, default_value_t = 30000, env = "AGENT_HUB_INVOKE_TIMEOUT_MS")]
    pub invoke_timeout_ms: u64,

    /// Streaming invocation timeout in milliseconds (covers the whole stream).
    #[arg(long, default_value_t = 120000, env = "AGENT_HUB_STREAM_TIMEOUT_MS")]
    pub stream_timeout_ms: u64,

    /// Background health re-probe interval in milliseconds. 0 disables.
    #[arg(long, default_value_t = 60000, env = "AGENT_HUB_HEALTH_CHECK_MS")]
    pub health_check_ms: u64,

    /// Path to the registry persistence file. In-memory only when unset.
    #[arg(long, env = "AGENT_HUB_DATA_FILE")]
    pub data_file: Option<std::path::PathBuf>,
}

impl HubConfig {
    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.invoke_timeout_ms)
    }

    pub fn stream_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn health_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.health_check_ms)
    }
}
