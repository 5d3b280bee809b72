// SPDX-License-Identifier: Apache-2.0

//! Background health refresher for all registered agents.

use std::sync::Arc;

use crate::state::HubState;
use crate::upstream::probe;

/// Spawn a single background task that periodically re-probes every
/// registered agent and updates its health flag.
///
/// Health is advisory: agents are never evicted here, and a refresh racing
/// a concurrent one is last-write-wins.
pub fn spawn_health_refresher(state: Arc<HubState>) {
    let interval = state.config.health_check_interval();
    if interval.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            // Snapshot, then probe outside the registry lock.
            let records = state.registry.list().await;
            for record in &records {
                let outcome = probe::probe(&record.url, state.config.probe_timeout()).await;
                if outcome.healthy != record.is_healthy {
                    tracing::info!(
                        agent_id = record.id,
                        url = %record.url,
                        healthy = outcome.healthy,
                        "agent health changed"
                    );
                }
                // None means the agent was deleted since the snapshot.
                let _ = state.registry.set_health(record.id, outcome.healthy).await;
            }
        }
    });
}
