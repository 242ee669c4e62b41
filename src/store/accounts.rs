//! Account repository: the configured mail accounts the coordinator
//! enumerates.

use crate::types::Account;

use super::{Store, StoreError};

impl Store {
    /// Mirror the configured accounts into the database, replacing prior
    /// enablement state for accounts that reappear.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn upsert_accounts(&self, accounts: &[Account]) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        for account in accounts {
            sqlx::query(
                "INSERT INTO accounts (provider, account_id, email, enabled)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(provider, account_id) DO UPDATE SET
                     email = excluded.email,
                     enabled = excluded.enabled",
            )
            .bind(&account.provider)
            .bind(&account.account_id)
            .bind(&account.email)
            .bind(i64::from(account.enabled))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Accounts the coordinator should sync, in stable order.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn list_enabled_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT provider, account_id, email, enabled FROM accounts \
             WHERE enabled = 1 ORDER BY provider, account_id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(provider, account_id, email, enabled)| Account {
                provider,
                account_id,
                email,
                enabled: enabled != 0,
            })
            .collect())
    }
}
