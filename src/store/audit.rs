//! Append-only audit log: one row for every decision and mutation.

use crate::types::AuditSeverity;

use super::{fmt_utc, Store, StoreError};

/// A decoded audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub category: String,
    pub severity: String,
    pub message: String,
    pub context: serde_json::Value,
    pub created_at_utc: String,
}

impl Store {
    /// Append an audit entry. Failures here are surfaced, not swallowed —
    /// audit durability is part of the mutation contract.
    ///
    /// # Errors
    ///
    /// Returns an error on encode or query failure.
    pub async fn audit(
        &self,
        category: &str,
        severity: AuditSeverity,
        message: &str,
        context: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audit_log (category, severity, message, context_json, created_at_utc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(category)
        .bind(severity.as_str())
        .bind(message)
        .bind(serde_json::to_string(&context)?)
        .bind(fmt_utc(chrono::Utc::now()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Most recent audit rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRow>, StoreError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT category, severity, message, context_json, created_at_utc \
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit_i64)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter()
            .map(|(category, severity, message, context_json, created_at_utc)| {
                Ok(AuditRow {
                    category,
                    severity,
                    message,
                    context: serde_json::from_str(&context_json)?,
                    created_at_utc,
                })
            })
            .collect()
    }
}
