// SPDX-License-Identifier: Apache-2.0

//! Registry persistence: load/save to JSON file with atomic writes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::registry::AgentRecord;

/// Persisted registry snapshot.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedRegistry {
    /// Next id to hand out, so ids stay unique across restarts.
    pub next_id: u64,
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
}

/// Load a persisted registry from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedRegistry> {
    let contents = std::fs::read_to_string(path)?;
    let registry: PersistedRegistry = serde_json::from_str(&contents)?;
    Ok(registry)
}

/// Save the registry to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) to avoid corruption when
/// concurrent saves race on the same `.tmp` file.
pub fn save(path: &Path, registry: &PersistedRegistry) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(registry)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
