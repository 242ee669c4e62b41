//! Ingestion: per-account sync services, the multi-account coordinator, the
//! adaptive cadence state machine, and the background sync loop that ties
//! them together.
//!
//! The loop sleeps `delay_minutes * 60 + jitter_seconds`, invokes the
//! coordinator, and feeds the outcome back into the state machine. It exits
//! cleanly on the shutdown signal; in-flight transactions roll back and
//! cursors do not advance.

pub mod coordinator;
pub mod scheduler;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::store::Store;

use self::coordinator::MultiAccountCoordinator;
use self::scheduler::{after_failure, after_success, next_interval, SyncState};

/// Preference key that pauses ingestion without stopping the daemon.
pub const SYNC_PAUSED_KEY: &str = "sync_paused";

/// Run the adaptive sync loop until shutdown.
///
/// The jitter seed is the loop's tick counter, so the sleep sequence is
/// reproducible for a given configuration. Setting the [`SYNC_PAUSED_KEY`]
/// preference to `"true"` skips passes until it is cleared.
pub async fn run_sync_loop(
    coordinator: Arc<MultiAccountCoordinator>,
    store: Store,
    config: SyncConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if coordinator.account_count() == 0 {
        info!("no enabled accounts; sync loop exiting");
        return;
    }

    let mut state = SyncState::Normal;
    let mut tick: i64 = 0;
    info!(accounts = coordinator.account_count(), "sync loop started");

    loop {
        let interval = next_interval(state, &config, tick);
        let sleep = Duration::from_secs(interval.total_seconds());

        tokio::select! {
            () = tokio::time::sleep(sleep) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("sync loop shutting down");
                    break;
                }
                continue;
            }
        }

        tick = tick.saturating_add(1);

        match store.get_preference(SYNC_PAUSED_KEY).await {
            Ok(Some(value)) if value == "true" => {
                info!("sync paused by preference; skipping pass");
                continue;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read sync_paused preference"),
        }

        let now = chrono::Local::now().naive_local();
        match coordinator.sync_all(now).await {
            Ok(summary) => {
                for failure in &summary.failures {
                    warn!(
                        provider = %failure.provider,
                        account_id = %failure.account_id,
                        reason = %failure.reason,
                        "partial sync failure"
                    );
                }
                state = after_success(summary.total_fetched());
            }
            Err(e) => {
                warn!(error = %e, "sync pass failed");
                state = after_failure(state);
            }
        }
    }

    info!("sync loop stopped");
}
