//! Id-recorded schema migrations, executed once at bootstrap.

use sqlx::SqlitePool;

use super::StoreError;

/// Ordered migration batches. Append only; never edit an applied batch.
const MIGRATIONS: &[(i64, &str)] = &[(1, SCHEMA_V1)];

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    provider        TEXT NOT NULL,
    account_id      TEXT NOT NULL,
    email           TEXT NOT NULL,
    enabled         INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (provider, account_id)
);

CREATE TABLE IF NOT EXISTS updates (
    update_id             TEXT PRIMARY KEY,
    account_id            TEXT NOT NULL,
    source                TEXT NOT NULL,
    provider_message_id   TEXT NOT NULL,
    provider_thread_id    TEXT,
    received_at_utc       TEXT NOT NULL,
    sender                TEXT NOT NULL,
    subject               TEXT NOT NULL,
    body_text             TEXT NOT NULL,
    links                 TEXT NOT NULL,
    tags                  TEXT NOT NULL,
    parser_method         TEXT NOT NULL,
    parse_confidence      REAL NOT NULL,
    evidence              TEXT NOT NULL,
    requires_confirmation INTEGER NOT NULL,
    content_hash          TEXT NOT NULL,
    created_at_utc        TEXT NOT NULL,
    UNIQUE (source, provider_message_id)
);

CREATE INDEX IF NOT EXISTS idx_updates_account ON updates(account_id);

CREATE TABLE IF NOT EXISTS tasks (
    task_id           TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    category          TEXT NOT NULL,
    due_at_local      TEXT,
    estimated_minutes INTEGER NOT NULL,
    min_daily_minutes INTEGER NOT NULL,
    priority          INTEGER NOT NULL,
    stress_weight     REAL NOT NULL,
    feasibility_state TEXT NOT NULL,
    status            TEXT NOT NULL,
    dedupe_key        TEXT NOT NULL UNIQUE,
    created_at_utc    TEXT NOT NULL,
    updated_at_utc    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

CREATE TABLE IF NOT EXISTS task_sources (
    task_id             TEXT NOT NULL,
    source              TEXT NOT NULL,
    account_id          TEXT NOT NULL,
    provider_message_id TEXT NOT NULL,
    confidence          REAL NOT NULL,
    UNIQUE (task_id, source, account_id, provider_message_id),
    FOREIGN KEY (task_id) REFERENCES tasks(task_id)
);

CREATE TABLE IF NOT EXISTS blocks (
    block_id          TEXT PRIMARY KEY,
    task_id           TEXT,
    title             TEXT NOT NULL,
    start_local       TEXT NOT NULL,
    end_local         TEXT NOT NULL,
    calendar_event_id TEXT,
    calendar_name     TEXT NOT NULL,
    managed_by_agent  INTEGER NOT NULL,
    lock_level        TEXT NOT NULL,
    plan_revision     INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_start ON blocks(start_local);

CREATE TABLE IF NOT EXISTS provider_cursors (
    provider        TEXT NOT NULL,
    account_id      TEXT NOT NULL,
    primary_value   TEXT NOT NULL,
    secondary_value TEXT NOT NULL,
    updated_at_utc  TEXT NOT NULL,
    PRIMARY KEY (provider, account_id)
);

CREATE TABLE IF NOT EXISTS plan_revisions (
    revision_id    INTEGER PRIMARY KEY,
    trigger_tag    TEXT NOT NULL,
    created        INTEGER NOT NULL,
    moved          INTEGER NOT NULL,
    deleted        INTEGER NOT NULL,
    created_at_utc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS operations (
    op_id                  TEXT PRIMARY KEY,
    expected_plan_revision INTEGER NOT NULL,
    applied_revision       INTEGER,
    intent                 TEXT NOT NULL,
    status                 TEXT NOT NULL,
    payload_json           TEXT NOT NULL,
    result_json            TEXT NOT NULL,
    created_at_utc         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_operations_status ON operations(status);

CREATE TABLE IF NOT EXISTS preferences (
    key            TEXT PRIMARY KEY,
    value          TEXT NOT NULL,
    updated_at_utc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    category       TEXT NOT NULL,
    severity       TEXT NOT NULL,
    message        TEXT NOT NULL,
    context_json   TEXT NOT NULL,
    created_at_utc TEXT NOT NULL
);
"#;

/// Run all unapplied migrations. Returns how many batches were applied.
///
/// Each batch executes together with its `schema_migrations` record inside
/// one transaction, so a crash mid-migration leaves the id unrecorded and the
/// batch re-runs on next bootstrap (statements are `IF NOT EXISTS`-safe).
///
/// # Errors
///
/// Returns an error if a batch fails to execute.
pub async fn run(pool: &SqlitePool) -> Result<u32, StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            id             INTEGER PRIMARY KEY,
            applied_at_utc TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let mut applied: u32 = 0;
    for (id, sql) in MIGRATIONS {
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM schema_migrations WHERE id = ?1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        if exists.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        // SQLite executes one statement per call; split on the blank-line
        // statement boundary used throughout the schema text.
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (id, applied_at_utc) VALUES (?1, ?2)")
            .bind(id)
            .bind(super::fmt_utc(chrono::Utc::now()))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        applied = applied.saturating_add(1);
    }
    Ok(applied)
}
