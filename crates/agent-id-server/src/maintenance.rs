//! Periodic cleanup of expired nonces and revocation entries.

use agent_id_crypto::current_timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Default interval between cleanup passes
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Run one cleanup pass, returning (nonces, revocations) removed
pub async fn run_once(state: &AppState) -> (usize, usize) {
    let nonces = match state.pipeline.purge_expired_nonces(current_timestamp()).await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Nonce purge failed");
            0
        }
    };

    let revocations = match state.revocations.purge_expired().await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Revocation purge failed");
            0
        }
    };

    debug!(nonces, revocations, "Maintenance pass complete");
    (nonces, revocations)
}

/// Spawn the cleanup loop; it stops when `shutdown` is cancelled
pub fn spawn(
    state: Arc<AppState>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    run_once(&state).await;
                }
            }
        }

        info!("Maintenance task stopped");
    })
}
