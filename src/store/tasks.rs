//! Task repository: upsert keyed by `dedupe_key`, provenance replacement,
//! and the active-task listing the planner consumes.

use sqlx::{Sqlite, Transaction};

use crate::types::{
    FeasibilityState, Source, Task, TaskCategory, TaskSource, TaskStatus,
};

use super::{fmt_naive, fmt_utc, parse_naive, Store, StoreError};

/// Upsert tasks by `dedupe_key`; on conflict mutable fields are refreshed and
/// the provenance rows for the surviving task are replaced.
///
/// Returns the number of tasks touched (inserted or updated).
pub(crate) async fn upsert_all(
    tx: &mut Transaction<'_, Sqlite>,
    tasks: &[Task],
) -> Result<u64, StoreError> {
    let now = fmt_utc(chrono::Utc::now());
    let mut touched: u64 = 0;
    for task in tasks {
        sqlx::query(
            "INSERT INTO tasks (
                task_id, title, category, due_at_local, estimated_minutes,
                min_daily_minutes, priority, stress_weight, feasibility_state,
                status, dedupe_key, created_at_utc, updated_at_utc
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ON CONFLICT(dedupe_key) DO UPDATE SET
                title = excluded.title,
                estimated_minutes = excluded.estimated_minutes,
                min_daily_minutes = excluded.min_daily_minutes,
                priority = excluded.priority,
                stress_weight = excluded.stress_weight,
                feasibility_state = excluded.feasibility_state,
                updated_at_utc = excluded.updated_at_utc",
        )
        .bind(&task.task_id)
        .bind(&task.title)
        .bind(task.category.as_str())
        .bind(task.due_at_local.map(fmt_naive))
        .bind(task.estimated_minutes)
        .bind(task.min_daily_minutes)
        .bind(task.priority)
        .bind(task.stress_weight)
        .bind(task.feasibility_state.as_str())
        .bind(task.status.as_str())
        .bind(&task.dedupe_key)
        .bind(&now)
        .execute(&mut **tx)
        .await?;

        // The conflict target keeps the original task_id; resolve it so the
        // provenance rows attach to the surviving row.
        let (canonical_id,): (String,) =
            sqlx::query_as("SELECT task_id FROM tasks WHERE dedupe_key = ?1")
                .bind(&task.dedupe_key)
                .fetch_one(&mut **tx)
                .await?;

        sqlx::query("DELETE FROM task_sources WHERE task_id = ?1")
            .bind(&canonical_id)
            .execute(&mut **tx)
            .await?;
        for source in &task.sources {
            sqlx::query(
                "INSERT OR IGNORE INTO task_sources (
                    task_id, source, account_id, provider_message_id, confidence
                ) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&canonical_id)
            .bind(source.source.as_str())
            .bind(&source.account_id)
            .bind(&source.provider_message_id)
            .bind(source.confidence)
            .execute(&mut **tx)
            .await?;
        }
        touched = touched.saturating_add(1);
    }
    Ok(touched)
}

type TaskRow = (
    String,         // task_id
    String,         // title
    String,         // category
    Option<String>, // due_at_local
    i64,            // estimated_minutes
    i64,            // min_daily_minutes
    i64,            // priority
    f64,            // stress_weight
    String,         // feasibility_state
    String,         // status
    String,         // dedupe_key
);

const SELECT_COLUMNS: &str = "task_id, title, category, due_at_local, estimated_minutes, \
     min_daily_minutes, priority, stress_weight, feasibility_state, status, dedupe_key";

fn row_to_task(row: TaskRow, sources: Vec<TaskSource>) -> Result<Task, StoreError> {
    Ok(Task {
        task_id: row.0,
        title: row.1,
        category: TaskCategory::parse(&row.2)?,
        due_at_local: row.3.as_deref().map(parse_naive).transpose()?,
        estimated_minutes: row.4,
        min_daily_minutes: row.5,
        priority: row.6,
        stress_weight: row.7,
        feasibility_state: FeasibilityState::parse(&row.8)?,
        status: TaskStatus::parse(&row.9)?,
        dedupe_key: row.10,
        sources,
    })
}

impl Store {
    /// Upsert tasks outside a sync batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert_tasks(&self, tasks: &[Task]) -> Result<u64, StoreError> {
        let mut tx = self.pool().begin().await?;
        let touched = upsert_all(&mut tx, tasks).await?;
        tx.commit().await?;
        Ok(touched)
    }

    /// Active tasks (todo or in_progress), ordered priority desc then due
    /// date asc with undated tasks last.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn list_active_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks \
             WHERE status IN ('todo', 'in_progress') \
             ORDER BY priority DESC, due_at_local IS NULL, due_at_local ASC, task_id ASC"
        ))
        .fetch_all(self.pool())
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let sources = self.task_sources(&row.0).await?;
            tasks.push(row_to_task(row, sources)?);
        }
        Ok(tasks)
    }

    /// Fetch one task by dedupe key.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn get_task_by_dedupe_key(
        &self,
        dedupe_key: &str,
    ) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks WHERE dedupe_key = ?1"
        ))
        .bind(dedupe_key)
        .fetch_optional(self.pool())
        .await?;
        match row {
            Some(row) => {
                let sources = self.task_sources(&row.0).await?;
                Ok(Some(row_to_task(row, sources)?))
            }
            None => Ok(None),
        }
    }

    /// Transition a task's lifecycle status. Tasks are never deleted.
    ///
    /// # Errors
    ///
    /// Returns an error when the task does not exist.
    pub async fn set_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = ?1, updated_at_utc = ?2 WHERE task_id = ?3",
        )
        .bind(status.as_str())
        .bind(fmt_utc(chrono::Utc::now()))
        .bind(task_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InvariantViolation(format!(
                "task not found: {task_id}"
            )));
        }
        Ok(())
    }

    /// Count all task rows.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn count_tasks(&self) -> Result<u64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM tasks")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0.cast_unsigned())
    }

    /// Provenance rows for one task.
    async fn task_sources(&self, task_id: &str) -> Result<Vec<TaskSource>, StoreError> {
        let rows: Vec<(String, String, String, f64)> = sqlx::query_as(
            "SELECT source, account_id, provider_message_id, confidence \
             FROM task_sources WHERE task_id = ?1 \
             ORDER BY account_id, provider_message_id",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter()
            .map(|(source, account_id, provider_message_id, confidence)| {
                Ok(TaskSource {
                    source: Source::parse(&source)?,
                    account_id,
                    provider_message_id,
                    confidence,
                })
            })
            .collect()
    }
}
