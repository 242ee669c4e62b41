//! Multi-account fan-out with per-account failure isolation.
//!
//! One failing account never aborts its siblings; only when every account
//! fails does the coordinator surface a single aggregated error.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::types::Account;

use super::service::{IngestionService, SyncOutcome};

/// One account's failure, captured without aborting siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFailure {
    pub provider: String,
    pub account_id: String,
    pub email: String,
    pub reason: String,
}

/// Aggregated result of one coordinator pass.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    /// Per-account outcomes for accounts that synced.
    pub results: Vec<(Account, SyncOutcome)>,
    /// Accounts that failed this pass.
    pub failures: Vec<AccountFailure>,
}

impl SyncSummary {
    /// Total messages fetched across accounts, for the cadence state machine.
    pub fn total_fetched(&self) -> u64 {
        self.results
            .iter()
            .map(|(_, outcome)| outcome.fetched)
            .fold(0, u64::saturating_add)
    }
}

/// Raised only when every enabled account failed.
#[derive(Debug, thiserror::Error)]
#[error("all_account_syncs_failed: {reasons}")]
pub struct AllAccountsFailed {
    /// Concatenated per-account reasons.
    pub reasons: String,
}

/// Fans one sync pass out over all enabled accounts.
pub struct MultiAccountCoordinator {
    services: Vec<Arc<IngestionService>>,
}

impl std::fmt::Debug for MultiAccountCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiAccountCoordinator")
            .field("accounts", &self.services.len())
            .finish()
    }
}

impl MultiAccountCoordinator {
    /// Build over pre-constructed per-account services.
    pub fn new(services: Vec<Arc<IngestionService>>) -> Self {
        Self { services }
    }

    /// Number of registered accounts.
    pub fn account_count(&self) -> usize {
        self.services.len()
    }

    /// Sync every account, isolating failures.
    ///
    /// Accounts run sequentially; per-account state never interleaves.
    ///
    /// # Errors
    ///
    /// Returns [`AllAccountsFailed`] only when there was at least one
    /// account and every one of them failed.
    pub async fn sync_all(&self, now: NaiveDateTime) -> Result<SyncSummary, AllAccountsFailed> {
        let mut summary = SyncSummary::default();

        for service in &self.services {
            let account = service.account().clone();
            match service.sync(now).await {
                Ok(outcome) => summary.results.push((account, outcome)),
                Err(e) => {
                    warn!(
                        provider = %account.provider,
                        account_id = %account.account_id,
                        error = %e,
                        "account sync failed"
                    );
                    summary.failures.push(AccountFailure {
                        provider: account.provider,
                        account_id: account.account_id,
                        email: account.email,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !self.services.is_empty() && summary.results.is_empty() {
            let reasons = summary
                .failures
                .iter()
                .map(|f| format!("{}/{}: {}", f.provider, f.account_id, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AllAccountsFailed { reasons });
        }

        Ok(summary)
    }
}
