//! Mail provider capability.
//!
//! Gmail and Outlook clients share only `fetch_messages(cursor)`; cursor
//! encoding stays on the provider side and the store persists an opaque
//! `(primary, secondary)` pair. This module defines the capability, the
//! shared error taxonomy, and the ordering/dedupe helpers both providers
//! use to make a fetched batch safe to ingest.

pub mod gmail;
pub mod memory;
pub mod outlook;

use async_trait::async_trait;

use crate::types::{InboundMessage, ProviderCursor, Source};

/// Errors surfaced by provider clients.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Retryable upstream failure; the scheduler backs off.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Operator action required (revoked token, missing scope).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The per-attempt deadline elapsed.
    #[error("provider deadline exceeded after {0}s")]
    DeadlineExceeded(u64),
}

impl ProviderError {
    /// True when the error should trigger backoff-and-retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::DeadlineExceeded(_))
    }
}

/// One fetched batch: messages plus the cursor to persist after commit.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch {
    /// Deduplicated messages sorted ascending by cursor tuple.
    pub messages: Vec<InboundMessage>,
    /// Cursor positioned after the newest message in the batch.
    pub next_cursor: ProviderCursor,
}

/// Capability every mail provider client implements.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Short provider name used for cursor rows (`gmail`, `outlook`).
    fn provider_name(&self) -> &'static str;

    /// Source stamped onto update cards from this provider.
    fn source(&self) -> Source;

    /// Fetch messages strictly after the cursor, following pagination until
    /// the provider reports no next link.
    ///
    /// Implementations must return messages deduplicated by message id and
    /// sorted ascending by `(primary, secondary)`; the helpers in this
    /// module do both.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] mapped from the upstream failure.
    async fn fetch_messages(&self, cursor: &ProviderCursor) -> Result<FetchBatch, ProviderError>;
}

// ---------------------------------------------------------------------------
// Batch preparation
// ---------------------------------------------------------------------------

/// Deduplicate by message id (first occurrence wins), drop messages at or
/// before the cursor position, and sort ascending by the provider's tuple
/// key.
///
/// Provider queries use an inclusive lower bound, so the page may repeat the
/// message the cursor points at as well as same-timestamp messages already
/// ingested; the strict `> cursor` tuple filter drops them without losing
/// same-timestamp messages that sort after the cursor's secondary.
pub fn prepare_batch<K: Ord>(
    mut messages: Vec<InboundMessage>,
    key_of: impl Fn(&InboundMessage) -> K,
    cursor_key: Option<K>,
) -> Vec<InboundMessage> {
    let mut seen = std::collections::HashSet::new();
    messages.retain(|m| seen.insert(m.message_id.clone()));
    if let Some(cursor_key) = cursor_key {
        messages.retain(|m| key_of(m) > cursor_key);
    }
    messages.sort_by(|a, b| key_of(a).cmp(&key_of(b)));
    messages
}

/// The cursor positioned after the last message of a prepared batch, or the
/// previous cursor when the batch is empty.
pub fn advanced_cursor(
    messages: &[InboundMessage],
    previous: &ProviderCursor,
    primary_of: impl Fn(&InboundMessage) -> String,
) -> ProviderCursor {
    match messages.last() {
        Some(last) => ProviderCursor::new(primary_of(last), last.message_id.clone()),
        None => previous.clone(),
    }
}
