//! Gmail cursor semantics.
//!
//! The cursor is `(internalDate seconds, message_id)`. The primary component
//! is numeric, so comparisons parse it rather than relying on string order
//! (`"9" > "10"` lexicographically).

use crate::types::{InboundMessage, ProviderCursor};

use super::{advanced_cursor, prepare_batch};

/// Provider name stored in cursor rows.
pub const PROVIDER_NAME: &str = "gmail";

/// Tuple key for one message: `(internalDate seconds, message_id)`.
pub fn message_key(message: &InboundMessage) -> (i64, String) {
    (
        message.received_at_utc.timestamp(),
        message.message_id.clone(),
    )
}

/// Decode a stored cursor into its comparable tuple. An empty or garbled
/// cursor decodes to `None` and the batch is taken from the beginning.
pub fn cursor_key(cursor: &ProviderCursor) -> Option<(i64, String)> {
    if cursor.is_empty() {
        return None;
    }
    let seconds: i64 = cursor.primary.parse().ok()?;
    Some((seconds, cursor.secondary.clone()))
}

/// Prepare raw pages for ingestion: dedupe, drop at-or-before-cursor rows,
/// sort ascending, and compute the advanced cursor.
pub fn prepare(
    pages: Vec<Vec<InboundMessage>>,
    cursor: &ProviderCursor,
) -> (Vec<InboundMessage>, ProviderCursor) {
    let merged: Vec<InboundMessage> = pages.into_iter().flatten().collect();
    let messages = prepare_batch(merged, message_key, cursor_key(cursor));
    let next = advanced_cursor(&messages, cursor, |m| {
        m.received_at_utc.timestamp().to_string()
    });
    (messages, next)
}
