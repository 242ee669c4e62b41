//! Adaptive sync cadence: a small state machine mapping recent sync history
//! to the next polling delay, with deterministic jitter and capped
//! exponential backoff.

use crate::config::SyncConfig;

/// Jitter modulus in seconds.
const JITTER_MOD: u64 = 31;

/// Where the sync loop currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// New mail arrived on the last sync; poll fast.
    Active,
    /// Steady state.
    Normal,
    /// Recent syncs were quiet; poll slow.
    Idle,
    /// Consecutive failures; back off exponentially.
    Error(u32),
}

/// The computed wait before the next sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextInterval {
    /// Base delay in minutes.
    pub delay_minutes: u64,
    /// Deterministic jitter in seconds, added on top.
    pub jitter_seconds: u64,
}

impl NextInterval {
    /// Total wait in seconds.
    pub fn total_seconds(&self) -> u64 {
        self.delay_minutes
            .saturating_mul(60)
            .saturating_add(self.jitter_seconds)
    }
}

/// Compute the next polling interval for a state.
///
/// Backoff doubles per consecutive failure from the active interval and is
/// capped at `max_backoff_minutes`. Jitter is `abs(seed) mod 31`, fully
/// determined by the seed.
pub fn next_interval(state: SyncState, config: &SyncConfig, seed: i64) -> NextInterval {
    let delay_minutes = match state {
        SyncState::Active => config.active_polling_minutes,
        SyncState::Normal => config.normal_polling_minutes,
        SyncState::Idle => config.idle_polling_minutes,
        SyncState::Error(retry_count) => {
            let doubled = config
                .active_polling_minutes
                .saturating_mul(2u64.saturating_pow(retry_count));
            doubled.max(1).min(config.max_backoff_minutes)
        }
    };
    NextInterval {
        delay_minutes,
        jitter_seconds: seed.unsigned_abs() % JITTER_MOD,
    }
}

/// State after a successful sync: active when anything was fetched, idle
/// otherwise; the retry counter resets either way.
pub fn after_success(fetched: u64) -> SyncState {
    if fetched > 0 {
        SyncState::Active
    } else {
        SyncState::Idle
    }
}

/// State after a failed sync: the retry counter grows by one.
pub fn after_failure(state: SyncState) -> SyncState {
    let retries = match state {
        SyncState::Error(n) => n.saturating_add(1),
        _ => 1,
    };
    SyncState::Error(retries)
}
