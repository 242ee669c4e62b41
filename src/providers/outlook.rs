//! Outlook (Microsoft Graph) cursor semantics.
//!
//! The cursor is `(receivedDateTime ISO-8601, message_id)`. The fixed-width
//! RFC 3339 rendering makes lexicographic order match chronological order,
//! so the primary component compares as a string.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{InboundMessage, ProviderCursor};

use super::{advanced_cursor, prepare_batch};

/// Provider name stored in cursor rows.
pub const PROVIDER_NAME: &str = "outlook";

/// Canonical fixed-width rendering of a receive instant.
pub fn primary_of(received_at_utc: DateTime<Utc>) -> String {
    received_at_utc.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Tuple key for one message: `(receivedDateTime, message_id)`.
pub fn message_key(message: &InboundMessage) -> (String, String) {
    (
        primary_of(message.received_at_utc),
        message.message_id.clone(),
    )
}

/// Decode a stored cursor into its comparable tuple.
pub fn cursor_key(cursor: &ProviderCursor) -> Option<(String, String)> {
    if cursor.is_empty() {
        return None;
    }
    Some((cursor.primary.clone(), cursor.secondary.clone()))
}

/// Prepare raw pages for ingestion: dedupe, drop at-or-before-cursor rows,
/// sort ascending, and compute the advanced cursor.
pub fn prepare(
    pages: Vec<Vec<InboundMessage>>,
    cursor: &ProviderCursor,
) -> (Vec<InboundMessage>, ProviderCursor) {
    let merged: Vec<InboundMessage> = pages.into_iter().flatten().collect();
    let messages = prepare_batch(merged, message_key, cursor_key(cursor));
    let next = advanced_cursor(&messages, cursor, |m| primary_of(m.received_at_utc));
    (messages, next)
}
