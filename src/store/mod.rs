//! Transactional SQLite persistence.
//!
//! The [`Store`] is the sole owner of the database. It exposes typed
//! repositories (updates, tasks, blocks, cursors, revisions, operations,
//! accounts, preferences, audit); services hold only in-memory views for the
//! duration of one operation. All multi-statement mutations run inside a
//! single transaction with rollback on error. Schema migrations execute once
//! at bootstrap and are recorded by id in `schema_migrations`.

pub mod accounts;
pub mod audit;
pub mod blocks;
pub mod cursors;
pub mod migrations;
pub mod operations;
pub mod preferences;
pub mod revisions;
pub mod tasks;
pub mod updates;

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::types::{InvalidEnum, ProviderCursor, Task, UpdateCard};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An invalid enum value was read from the database.
    #[error(transparent)]
    InvalidEnum(#[from] InvalidEnum),

    /// JSON blob failed to decode.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted timestamp failed to parse.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// A row invariant was violated.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result of committing one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCommit {
    /// Newly inserted update rows (duplicates ignored).
    pub stored_updates: u64,
    /// Tasks inserted or refreshed by the batch.
    pub touched_tasks: u64,
}

/// Handle to the SQLite database, shared across services.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if missing) the database at `path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or a migration fails.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        let applied = migrations::run(&store.pool).await?;
        if applied > 0 {
            info!(applied, path = %path.display(), "schema migrations applied");
        }
        Ok(store)
    }

    /// Open an in-memory database for testing.
    ///
    /// A single connection keeps the shared in-memory database alive.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool cannot be created.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        migrations::run(&store.pool).await?;
        Ok(store)
    }

    /// The underlying pool, for repository modules.
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Commit one ingestion batch atomically: update cards, tasks with their
    /// provenance rows, and the advanced provider cursor.
    ///
    /// An observer never sees the advanced cursor without the corresponding
    /// rows; any failure rolls the whole batch back and leaves the cursor
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement in the batch fails.
    pub async fn commit_sync_batch(
        &self,
        cards: &[UpdateCard],
        tasks: &[Task],
        provider: &str,
        account_id: &str,
        next_cursor: &ProviderCursor,
    ) -> Result<SyncCommit, StoreError> {
        let mut tx = self.pool.begin().await?;
        let stored_updates = updates::insert_ignore(&mut tx, cards).await?;
        let touched_tasks = tasks::upsert_all(&mut tx, tasks).await?;
        if !next_cursor.is_empty() {
            cursors::upsert_tx(&mut tx, provider, account_id, next_cursor).await?;
        }
        tx.commit().await?;
        Ok(SyncCommit {
            stored_updates,
            touched_tasks,
        })
    }
}

// ---------------------------------------------------------------------------
// Timestamp codecs
// ---------------------------------------------------------------------------

/// Local wall-clock format stored in `*_local` columns.
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Render a UTC instant as RFC 3339 for storage.
pub(crate) fn fmt_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a stored RFC 3339 instant.
pub(crate) fn parse_utc(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp(s.to_owned()))
}

/// Render a local wall-clock time for storage.
pub(crate) fn fmt_naive(dt: NaiveDateTime) -> String {
    dt.format(NAIVE_FORMAT).to_string()
}

/// Parse a stored local wall-clock time.
pub(crate) fn parse_naive(s: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(s, NAIVE_FORMAT)
        .map_err(|_| StoreError::InvalidTimestamp(s.to_owned()))
}
