// SPDX-License-Identifier: Apache-2.0

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::registry::Registry;

/// Shared hub state.
pub struct HubState {
    pub registry: Registry,
    pub config: HubConfig,
    pub shutdown: CancellationToken,
}

impl HubState {
    pub fn new(config: HubConfig, registry: Registry, shutdown: CancellationToken) -> Self {
        Self { registry, config, shutdown }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
