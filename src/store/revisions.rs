//! Plan-revision ledger: a strictly monotonic counter whose source of truth
//! is the database. Each successful mutation appends one row.

use sqlx::{Sqlite, Transaction};

use crate::types::{PlanRevision, RevisionSummary};

use super::{fmt_utc, parse_utc, Store, StoreError};

/// Allocate the next revision id and append its row inside `tx`.
pub(crate) async fn append_tx(
    tx: &mut Transaction<'_, Sqlite>,
    trigger: &str,
    summary: RevisionSummary,
) -> Result<i64, StoreError> {
    let (latest,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(revision_id), 0) FROM plan_revisions")
            .fetch_one(&mut **tx)
            .await?;
    let next = latest.saturating_add(1);
    sqlx::query(
        "INSERT INTO plan_revisions (revision_id, trigger_tag, created, moved, deleted, created_at_utc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(next)
    .bind(trigger)
    .bind(summary.created)
    .bind(summary.moved)
    .bind(summary.deleted)
    .bind(fmt_utc(chrono::Utc::now()))
    .execute(&mut **tx)
    .await?;
    Ok(next)
}

impl Store {
    /// Latest revision id, 0 when no revision exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn latest_revision_id(&self) -> Result<i64, StoreError> {
        let (latest,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(revision_id), 0) FROM plan_revisions")
                .fetch_one(self.pool())
                .await?;
        Ok(latest)
    }

    /// Append a revision row, monotonically allocating the next id.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn append_revision(
        &self,
        trigger: &str,
        summary: RevisionSummary,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool().begin().await?;
        let id = append_tx(&mut tx, trigger, summary).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Most recent revision rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn recent_revisions(&self, limit: usize) -> Result<Vec<PlanRevision>, StoreError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(i64, String, i64, i64, i64, String)> = sqlx::query_as(
            "SELECT revision_id, trigger_tag, created, moved, deleted, created_at_utc \
             FROM plan_revisions ORDER BY revision_id DESC LIMIT ?1",
        )
        .bind(limit_i64)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter()
            .map(|(revision_id, trigger, created, moved, deleted, created_at)| {
                Ok(PlanRevision {
                    revision_id,
                    trigger,
                    summary: RevisionSummary {
                        created,
                        moved,
                        deleted,
                    },
                    created_at_utc: parse_utc(&created_at)?,
                })
            })
            .collect()
    }
}
