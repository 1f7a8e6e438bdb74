//! One background task per periodic sweep needed outside the per-process
//! agent/registry request loops: registry crash detection
//! (§4.D `checkCrashed`) and party maintenance (§4.E). Time-based
//! persistence has its own worker owned by `StorageManager` (§4.G2) and is
//! started directly off `storage.initialize()` in `main`.

use std::sync::Arc;
use std::time::Duration;

use crate::app_state::AppState;

/// Liveness sweep cadence. Must run more often than the 60s crash window
/// (§4.D, §8) so a crashed server is never visibly stale for more than one
/// extra sweep interval.
const LIVENESS_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Party maintenance cadence (§4.E: "a maintenance pass (every N seconds)").
const PARTY_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

pub fn spawn_liveness_sweep(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIVENESS_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let crashed = state
                .registry
                .check_crashed(registry::CRASH_WINDOW)
                .await;
            if !crashed.is_empty() {
                tracing::warn!(?crashed, "liveness sweep marked servers offline");
            }
        }
    })
}

pub fn spawn_party_maintenance(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PARTY_MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(error) = state.party.run_maintenance_sweep().await {
                tracing::warn!(error = %error, "party maintenance sweep failed");
            }
        }
    })
}
