//! Operation log: one durable row per attempted edit. Applied create/move
//! operations carry a reversible undo envelope in `result_json`; the
//! `applied → undone` transition happens exactly once.

use crate::types::{Operation, OperationStatus};

use super::{fmt_utc, parse_utc, Store, StoreError};

type OperationRow = (
    String,      // op_id
    i64,         // expected_plan_revision
    Option<i64>, // applied_revision
    String,      // intent
    String,      // status
    String,      // payload_json
    String,      // result_json
    String,      // created_at_utc
);

const SELECT_COLUMNS: &str = "op_id, expected_plan_revision, applied_revision, intent, \
     status, payload_json, result_json, created_at_utc";

fn row_to_operation(row: OperationRow) -> Result<Operation, StoreError> {
    Ok(Operation {
        op_id: row.0,
        expected_plan_revision: row.1,
        applied_revision: row.2,
        intent: row.3,
        status: OperationStatus::parse(&row.4)?,
        payload_json: serde_json::from_str(&row.5)?,
        result_json: serde_json::from_str(&row.6)?,
        created_at_utc: parse_utc(&row.7)?,
    })
}

impl Store {
    /// Insert an operation record.
    ///
    /// # Errors
    ///
    /// Returns an error on encode or query failure.
    pub async fn insert_operation(&self, op: &Operation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO operations (
                op_id, expected_plan_revision, applied_revision, intent,
                status, payload_json, result_json, created_at_utc
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&op.op_id)
        .bind(op.expected_plan_revision)
        .bind(op.applied_revision)
        .bind(&op.intent)
        .bind(op.status.as_str())
        .bind(serde_json::to_string(&op.payload_json)?)
        .bind(serde_json::to_string(&op.result_json)?)
        .bind(fmt_utc(op.created_at_utc))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// The most recent applied create/move operation, if any — the candidate
    /// for a durable undo after restart.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn latest_undoable_operation(&self) -> Result<Option<Operation>, StoreError> {
        let row: Option<OperationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM operations \
             WHERE status = 'applied' AND intent IN ('create_block', 'move_block') \
             ORDER BY created_at_utc DESC, rowid DESC LIMIT 1"
        ))
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_operation).transpose()
    }

    /// Mark an applied operation as undone. The transition is allowed once.
    ///
    /// # Errors
    ///
    /// Returns an invariant error if the operation is not in `applied` state.
    pub async fn mark_operation_undone(&self, op_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE operations SET status = 'undone' WHERE op_id = ?1 AND status = 'applied'",
        )
        .bind(op_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InvariantViolation(format!(
                "operation {op_id} is not undoable"
            )));
        }
        Ok(())
    }

    /// Highest revision ever written by an applied (or since-undone)
    /// operation. Used to hydrate the command service after restart.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn latest_applied_revision(&self) -> Result<i64, StoreError> {
        let (latest,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(applied_revision), 0) FROM operations \
             WHERE applied_revision IS NOT NULL",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(latest)
    }

    /// Fetch one operation by id.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn get_operation(&self, op_id: &str) -> Result<Option<Operation>, StoreError> {
        let row: Option<OperationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM operations WHERE op_id = ?1"
        ))
        .bind(op_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_operation).transpose()
    }
}
