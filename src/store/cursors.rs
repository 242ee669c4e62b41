//! Provider-cursor repository: one `(primary, secondary)` pair per
//! `(provider, account)`.
//!
//! Cursors are advanced only inside a successful sync transaction; a failed
//! batch leaves them untouched.

use sqlx::{Sqlite, Transaction};

use crate::types::ProviderCursor;

use super::{fmt_utc, Store, StoreError};

/// Last-writer-wins upsert within the sync transaction.
pub(crate) async fn upsert_tx(
    tx: &mut Transaction<'_, Sqlite>,
    provider: &str,
    account_id: &str,
    cursor: &ProviderCursor,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO provider_cursors (provider, account_id, primary_value, secondary_value, updated_at_utc)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(provider, account_id) DO UPDATE SET
             primary_value = excluded.primary_value,
             secondary_value = excluded.secondary_value,
             updated_at_utc = excluded.updated_at_utc",
    )
    .bind(provider)
    .bind(account_id)
    .bind(&cursor.primary)
    .bind(&cursor.secondary)
    .bind(fmt_utc(chrono::Utc::now()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl Store {
    /// The stored cursor for `(provider, account)`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn get_cursor(
        &self,
        provider: &str,
        account_id: &str,
    ) -> Result<Option<ProviderCursor>, StoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT primary_value, secondary_value FROM provider_cursors \
             WHERE provider = ?1 AND account_id = ?2",
        )
        .bind(provider)
        .bind(account_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(primary, secondary)| ProviderCursor { primary, secondary }))
    }

    /// Upsert a cursor outside a sync batch (used by tests and ops tooling).
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn upsert_cursor(
        &self,
        provider: &str,
        account_id: &str,
        cursor: &ProviderCursor,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        upsert_tx(&mut tx, provider, account_id, cursor).await?;
        tx.commit().await?;
        Ok(())
    }
}
