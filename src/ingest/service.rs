//! Per-account ingestion: cursor-based incremental fetch → parse → gate →
//! extract → atomic upsert.
//!
//! Failure at any step aborts the sync without advancing the cursor.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::apply::PlanApplyService;
use crate::llm::LlmClient;
use crate::parser::{ParsedUpdate, ParserPipeline};
use crate::providers::{MailProvider, ProviderError};
use crate::rules::{RulesEngine, UpdateContext};
use crate::store::{Store, StoreError};
use crate::types::{Account, AuditSeverity, ProviderCursor, Task};

/// Errors that abort one account's sync.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Upstream fetch failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persistence failed; the transaction rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The extractor transport failed.
    #[error("extractor error: {0}")]
    Extractor(String),
}

/// What one successful sync did.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Messages fetched upstream after cursor filtering.
    pub fetched: u64,
    /// Update cards produced by the parser (digest fan-out included).
    pub parsed: u64,
    /// New update rows persisted (duplicates ignored).
    pub stored_updates: u64,
    /// Tasks inserted or refreshed.
    pub touched_tasks: u64,
    /// Cursor persisted with the batch.
    pub next_cursor: ProviderCursor,
}

/// Ingestion pipeline scoped to one `(provider, account)`.
pub struct IngestionService {
    provider: Arc<dyn MailProvider>,
    store: Store,
    parser: ParserPipeline,
    rules: RulesEngine,
    llm: Arc<dyn LlmClient>,
    apply: Option<Arc<PlanApplyService>>,
    account: Account,
    confidence_threshold: f64,
}

impl std::fmt::Debug for IngestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService")
            .field("provider", &self.provider.provider_name())
            .field("account_id", &self.account.account_id)
            .finish_non_exhaustive()
    }
}

impl IngestionService {
    /// Build the service over its collaborators. `apply` is optional; when
    /// present, a successful sync triggers a plan regeneration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn MailProvider>,
        store: Store,
        parser: ParserPipeline,
        llm: Arc<dyn LlmClient>,
        apply: Option<Arc<PlanApplyService>>,
        account: Account,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            provider,
            store,
            parser,
            rules: RulesEngine,
            llm,
            apply,
            account,
            confidence_threshold,
        }
    }

    /// The account this service syncs.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Run one incremental sync.
    ///
    /// Atomic per account: updates, tasks, and the advanced cursor commit
    /// together, or not at all.
    ///
    /// # Errors
    ///
    /// Returns an [`IngestError`]; the cursor is untouched in every error
    /// case.
    pub async fn sync(&self, now: NaiveDateTime) -> Result<SyncOutcome, IngestError> {
        let provider_name = self.provider.provider_name();
        let account_id = self.account.account_id.as_str();

        let cursor = self
            .store
            .get_cursor(provider_name, account_id)
            .await?
            .unwrap_or_default();

        let batch = self.provider.fetch_messages(&cursor).await?;
        let fetched = u64::try_from(batch.messages.len()).unwrap_or(u64::MAX);
        debug!(provider = provider_name, account_id, fetched, "fetched messages");

        // Parse and stamp ownership.
        let source = self.provider.source();
        let mut parsed: Vec<ParsedUpdate> = Vec::new();
        for message in &batch.messages {
            for mut update in self.parser.parse(source, message) {
                update.card.account_id = account_id.to_owned();
                parsed.push(update);
            }
        }

        // Confidence gate: only approved cards reach the extractor.
        let ctx = UpdateContext {
            threshold: self.confidence_threshold,
        };
        let approved: Vec<ParsedUpdate> = parsed
            .iter()
            .filter(|update| self.rules.validate_update(&update.card, &ctx).is_approved())
            .cloned()
            .collect();

        let tasks = self
            .llm
            .extract_tasks(&approved)
            .await
            .map_err(|e| IngestError::Extractor(e.to_string()))?;
        // Provenance is mandatory: a task with no source row is a schema
        // violation and is dropped.
        let tasks: Vec<Task> = tasks
            .into_iter()
            .filter(|task| {
                let ok = !task.sources.is_empty();
                if !ok {
                    warn!(title = %task.title, "extracted task missing provenance, dropped");
                }
                ok
            })
            .collect();

        let cards: Vec<_> = parsed.iter().map(|u| u.card.clone()).collect();
        let commit = self
            .store
            .commit_sync_batch(
                &cards,
                &tasks,
                provider_name,
                account_id,
                &batch.next_cursor,
            )
            .await?;

        self.store
            .audit(
                "ingest",
                AuditSeverity::Info,
                "sync committed",
                serde_json::json!({
                    "provider": provider_name,
                    "account_id": account_id,
                    "fetched": fetched,
                    "stored_updates": commit.stored_updates,
                    "touched_tasks": commit.touched_tasks,
                }),
            )
            .await?;

        // The batch is durable; regeneration failures no longer roll it
        // back, they only get logged.
        if commit.touched_tasks > 0 {
            if let Some(ref apply) = self.apply {
                let trigger = format!("{provider_name}_sync");
                if let Err(e) = apply.regenerate(now, &trigger).await {
                    warn!(error = %e, trigger, "post-sync regeneration failed");
                }
            }
        }

        info!(
            provider = provider_name,
            account_id,
            fetched,
            stored_updates = commit.stored_updates,
            touched_tasks = commit.touched_tasks,
            "sync complete"
        );

        Ok(SyncOutcome {
            fetched,
            parsed: u64::try_from(parsed.len()).unwrap_or(u64::MAX),
            stored_updates: commit.stored_updates,
            touched_tasks: commit.touched_tasks,
            next_cursor: batch.next_cursor,
        })
    }
}
