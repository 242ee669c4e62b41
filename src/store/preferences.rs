//! Preference repository: durable key/value toggles for the operator.

use super::{fmt_utc, Store, StoreError};

impl Store {
    /// Read a preference value.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM preferences WHERE key = ?1")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Write a preference value, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO preferences (key, value, updated_at_utc) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at_utc = excluded.updated_at_utc",
        )
        .bind(key)
        .bind(value)
        .bind(fmt_utc(chrono::Utc::now()))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
