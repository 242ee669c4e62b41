//! Calendar-block repository: the local mirror of blocks the agent has
//! placed on the managed calendar.

use chrono::NaiveDate;

use crate::types::{CalendarBlock, LockLevel};

use super::{fmt_naive, parse_naive, Store, StoreError};

type BlockRow = (
    String,         // block_id
    Option<String>, // task_id
    String,         // title
    String,         // start_local
    String,         // end_local
    Option<String>, // calendar_event_id
    String,         // calendar_name
    i64,            // managed_by_agent
    String,         // lock_level
    i64,            // plan_revision
);

const SELECT_COLUMNS: &str = "block_id, task_id, title, start_local, end_local, \
     calendar_event_id, calendar_name, managed_by_agent, lock_level, plan_revision";

fn row_to_block(row: BlockRow) -> Result<CalendarBlock, StoreError> {
    Ok(CalendarBlock {
        block_id: row.0,
        task_id: row.1,
        title: row.2,
        start_local: parse_naive(&row.3)?,
        end_local: parse_naive(&row.4)?,
        calendar_event_id: row.5,
        calendar_name: row.6,
        managed_by_agent: row.7 != 0,
        lock_level: LockLevel::parse(&row.8)?,
        plan_revision: row.9,
    })
}

impl Store {
    /// Insert or replace a block row.
    ///
    /// # Errors
    ///
    /// Returns an error when the block's time window is inverted or the
    /// insert fails.
    pub async fn upsert_block(&self, block: &CalendarBlock) -> Result<(), StoreError> {
        if block.start_local >= block.end_local {
            return Err(StoreError::InvariantViolation(format!(
                "block {} has start >= end",
                block.block_id
            )));
        }
        sqlx::query(
            "INSERT OR REPLACE INTO blocks (
                block_id, task_id, title, start_local, end_local,
                calendar_event_id, calendar_name, managed_by_agent,
                lock_level, plan_revision
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&block.block_id)
        .bind(&block.task_id)
        .bind(&block.title)
        .bind(fmt_naive(block.start_local))
        .bind(fmt_naive(block.end_local))
        .bind(&block.calendar_event_id)
        .bind(&block.calendar_name)
        .bind(i64::from(block.managed_by_agent))
        .bind(block.lock_level.as_str())
        .bind(block.plan_revision)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Delete a block row by id. Missing rows are not an error; deletes are
    /// idempotent so re-applied undos stay safe.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn delete_block(&self, block_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM blocks WHERE block_id = ?1")
            .bind(block_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Blocks overlapping the given local date, ordered by start.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn blocks_on_date(&self, date: NaiveDate) -> Result<Vec<CalendarBlock>, StoreError> {
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| StoreError::InvariantViolation("invalid date".to_owned()))?;
        let next_day = date
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| StoreError::InvariantViolation("date overflow".to_owned()))?;
        let rows: Vec<BlockRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM blocks \
             WHERE start_local < ?1 AND end_local > ?2 \
             ORDER BY start_local ASC, block_id ASC"
        ))
        .bind(fmt_naive(next_day))
        .bind(fmt_naive(day_start))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_block).collect()
    }

    /// Fetch one block row by id.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn get_block(&self, block_id: &str) -> Result<Option<CalendarBlock>, StoreError> {
        let row: Option<BlockRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM blocks WHERE block_id = ?1"
        ))
        .bind(block_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_block).transpose()
    }
}
