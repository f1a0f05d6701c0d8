//! Background tasks.
//!
//! The reaper runs on a fixed interval; hash verification is spawned once per
//! upload that needs it. Clips left unverified by a restart or an abandoned
//! run are picked up again at start-up and after every sweep. All of these
//! report failures through logs only.

use metbox_core::types::Code;
use metbox_core::{ClipStore, VerifyOutcome};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Delay before the first sweep, letting the server start up.
const STARTUP_DELAY: Duration = Duration::from_secs(10);

/// Spawn the periodic reaper.
pub fn spawn_reaper(store: Arc<ClipStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(STARTUP_DELAY).await;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut first = true;

        loop {
            ticker.tick().await;

            let store = store.clone();
            let first_run = std::mem::take(&mut first);
            let sweep = tokio::task::spawn_blocking(move || {
                let now = SystemTime::now();
                // A restart shortly after a sweep should not sweep again.
                if first_run && !store.should_run_maintenance(now, period) {
                    tracing::debug!("Skipping start-up reap, last run is recent");
                    return;
                }
                store.reap(now);
                verify_pending(&store);
            });
            if let Err(e) = sweep.await {
                tracing::warn!("Reaper task failed: {}", e);
            }
        }
    })
}

/// Hash an uploaded file in the background.
pub fn spawn_verification(store: Arc<ClipStore>, code: Code) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || verify_one(&store, &code))
}

/// Verify every stored file clip whose hash is still unconfirmed.
pub fn spawn_pending_verification(store: Arc<ClipStore>) -> JoinHandle<usize> {
    tokio::task::spawn_blocking(move || verify_pending(&store))
}

fn verify_pending(store: &ClipStore) -> usize {
    let codes = match store.unverified_codes() {
        Ok(codes) => codes,
        Err(e) => {
            tracing::warn!("Failed to list unverified clips: {}", e);
            return 0;
        }
    };

    if !codes.is_empty() {
        tracing::info!(count = codes.len(), "Resuming pending verifications");
    }
    for code in &codes {
        verify_one(store, code);
    }
    codes.len()
}

fn verify_one(store: &ClipStore, code: &Code) {
    match store.verify(code, SystemTime::now()) {
        Ok(VerifyOutcome::Mismatch { .. }) => {
            tracing::info!(code = %code, "clip removed after failed verification");
        }
        Ok(outcome) => tracing::debug!(code = %code, ?outcome, "verification done"),
        Err(e) => tracing::warn!(code = %code, error = %e, "verification abandoned"),
    }
}
