//! Update-card repository: insert-or-ignore keyed by
//! `(source, provider_message_id)`. Cards are immutable once stored.

use sqlx::{Sqlite, Transaction};

use crate::types::{ParserMethod, Source, UpdateCard};

use super::{fmt_utc, parse_utc, Store, StoreError};

/// Insert cards, ignoring duplicates. Returns the number actually inserted.
pub(crate) async fn insert_ignore(
    tx: &mut Transaction<'_, Sqlite>,
    cards: &[UpdateCard],
) -> Result<u64, StoreError> {
    let mut inserted: u64 = 0;
    for card in cards {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO updates (
                update_id, account_id, source, provider_message_id,
                provider_thread_id, received_at_utc, sender, subject,
                body_text, links, tags, parser_method, parse_confidence,
                evidence, requires_confirmation, content_hash, created_at_utc
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )
        .bind(&card.update_id)
        .bind(&card.account_id)
        .bind(card.source.as_str())
        .bind(&card.provider_message_id)
        .bind(&card.provider_thread_id)
        .bind(fmt_utc(card.received_at_utc))
        .bind(&card.sender)
        .bind(&card.subject)
        .bind(&card.body_text)
        .bind(serde_json::to_string(&card.links)?)
        .bind(serde_json::to_string(&card.tags)?)
        .bind(card.parser_method.as_str())
        .bind(card.parse_confidence)
        .bind(serde_json::to_string(&card.evidence)?)
        .bind(i64::from(card.requires_confirmation))
        .bind(&card.content_hash)
        .bind(fmt_utc(chrono::Utc::now()))
        .execute(&mut **tx)
        .await?;
        inserted = inserted.saturating_add(result.rows_affected());
    }
    Ok(inserted)
}

type UpdateRow = (
    String,         // update_id
    String,         // account_id
    String,         // source
    String,         // provider_message_id
    Option<String>, // provider_thread_id
    String,         // received_at_utc
    String,         // sender
    String,         // subject
    String,         // body_text
    String,         // links
    String,         // tags
    String,         // parser_method
    f64,            // parse_confidence
    String,         // evidence
    i64,            // requires_confirmation
    String,         // content_hash
);

const SELECT_COLUMNS: &str = "update_id, account_id, source, provider_message_id, \
     provider_thread_id, received_at_utc, sender, subject, body_text, links, tags, \
     parser_method, parse_confidence, evidence, requires_confirmation, content_hash";

fn row_to_card(row: UpdateRow) -> Result<UpdateCard, StoreError> {
    Ok(UpdateCard {
        update_id: row.0,
        account_id: row.1,
        source: Source::parse(&row.2)?,
        provider_message_id: row.3,
        provider_thread_id: row.4,
        received_at_utc: parse_utc(&row.5)?,
        sender: row.6,
        subject: row.7,
        body_text: row.8,
        links: serde_json::from_str(&row.9)?,
        tags: serde_json::from_str(&row.10)?,
        parser_method: ParserMethod::parse(&row.11)?,
        parse_confidence: row.12,
        evidence: serde_json::from_str(&row.13)?,
        requires_confirmation: row.14 != 0,
        content_hash: row.15,
    })
}

impl Store {
    /// Insert cards outside a sync batch, ignoring duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn upsert_updates(&self, cards: &[UpdateCard]) -> Result<u64, StoreError> {
        let mut tx = self.pool().begin().await?;
        let inserted = insert_ignore(&mut tx, cards).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Fetch one card by its natural key.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn get_update(
        &self,
        source: Source,
        provider_message_id: &str,
    ) -> Result<Option<UpdateCard>, StoreError> {
        let row: Option<UpdateRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM updates WHERE source = ?1 AND provider_message_id = ?2"
        ))
        .bind(source.as_str())
        .bind(provider_message_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_card).transpose()
    }

    /// Count stored update cards, optionally scoped to one account.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub async fn count_updates(&self, account_id: Option<&str>) -> Result<u64, StoreError> {
        let row: (i64,) = match account_id {
            Some(account) => {
                sqlx::query_as("SELECT count(*) FROM updates WHERE account_id = ?1")
                    .bind(account)
                    .fetch_one(self.pool())
                    .await?
            }
            None => {
                sqlx::query_as("SELECT count(*) FROM updates")
                    .fetch_one(self.pool())
                    .await?
            }
        };
        Ok(row.0.cast_unsigned())
    }

    /// Recent cards for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on query or decode failure.
    pub async fn recent_updates(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<UpdateCard>, StoreError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<UpdateRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM updates WHERE account_id = ?1 \
             ORDER BY received_at_utc DESC LIMIT ?2"
        ))
        .bind(account_id)
        .bind(limit_i64)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_card).collect()
    }
}
