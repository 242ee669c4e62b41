//! In-memory mail provider serving scripted pages.
//!
//! Stands in for a real client wherever a test (or a dry run) needs
//! deterministic upstream behavior: pages are consumed once per fetch, and a
//! queued failure surfaces exactly once.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::types::{InboundMessage, ProviderCursor, Source};

use super::{gmail, outlook, FetchBatch, MailProvider, ProviderError};

/// Scripted provider state: pending pages and an optional queued failure.
#[derive(Debug, Default)]
struct ScriptState {
    pages: Vec<Vec<InboundMessage>>,
    fail_next: Option<String>,
}

/// A scripted [`MailProvider`] over in-memory pages.
#[derive(Debug)]
pub struct StaticMailProvider {
    provider_name: &'static str,
    source: Source,
    state: Mutex<ScriptState>,
}

impl StaticMailProvider {
    /// A scripted Gmail-flavoured provider.
    pub fn gmail() -> Self {
        Self {
            provider_name: gmail::PROVIDER_NAME,
            source: Source::Gmail,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// A scripted Outlook-flavoured provider.
    pub fn outlook() -> Self {
        Self {
            provider_name: outlook::PROVIDER_NAME,
            source: Source::Outlook,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Queue one page of messages for the next fetch.
    pub fn push_page(&self, page: Vec<InboundMessage>) {
        if let Ok(mut state) = self.state.lock() {
            state.pages.push(page);
        }
    }

    /// Make the next fetch fail with a transient error.
    pub fn fail_next(&self, reason: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = Some(reason.to_owned());
        }
    }
}

#[async_trait]
impl MailProvider for StaticMailProvider {
    fn provider_name(&self) -> &'static str {
        self.provider_name
    }

    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_messages(&self, cursor: &ProviderCursor) -> Result<FetchBatch, ProviderError> {
        let pages = {
            let mut state = self
                .state
                .lock()
                .map_err(|e| ProviderError::Transient(format!("script lock poisoned: {e}")))?;
            if let Some(reason) = state.fail_next.take() {
                return Err(ProviderError::Transient(reason));
            }
            std::mem::take(&mut state.pages)
        };

        let (messages, next_cursor) = match self.source {
            Source::Gmail => gmail::prepare(pages, cursor),
            _ => outlook::prepare(pages, cursor),
        };
        Ok(FetchBatch {
            messages,
            next_cursor,
        })
    }
}
