//! Calendar capability.
//!
//! The agent consumes a [`CalendarStore`]; the actual backend (EventKit,
//! CalDAV, Google Calendar) lives outside this crate. Every mutating method
//! takes the managed calendar name explicitly — the agent never touches
//! events outside that calendar without confirmation.
//!
//! [`InMemoryCalendarStore`] is the in-crate implementation used by tests
//! and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::CalendarBlock;

/// Errors surfaced by calendar backends.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    /// The user denied (or revoked) calendar access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The named calendar does not exist and could not be created.
    #[error("calendar not available: {0}")]
    CalendarNotAvailable(String),

    /// The referenced event no longer exists.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// No calendar backend on this platform.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Capability abstraction over the calendar backend.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Create the managed calendar if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a [`CalendarError`] when the backend refuses.
    async fn ensure_managed_calendar(&self, name: &str) -> Result<(), CalendarError>;

    /// All agent-managed blocks on the given local date, in start order.
    ///
    /// # Errors
    ///
    /// Returns a [`CalendarError`] when the backend refuses.
    async fn fetch_managed_blocks(
        &self,
        on_date: NaiveDate,
        calendar_name: &str,
    ) -> Result<Vec<CalendarBlock>, CalendarError>;

    /// Managed blocks whose title matches the fuzzy needle
    /// (case-insensitive substring), optionally restricted to one date.
    ///
    /// # Errors
    ///
    /// Returns a [`CalendarError`] when the backend refuses.
    async fn find_managed_blocks(
        &self,
        fuzzy_title: &str,
        on_date: Option<NaiveDate>,
        calendar_name: &str,
    ) -> Result<Vec<CalendarBlock>, CalendarError>;

    /// Every block overlapping the given local window — any calendar,
    /// agent-managed or not. This is how callers detect that an edit would
    /// touch an event the agent does not own.
    ///
    /// # Errors
    ///
    /// Returns a [`CalendarError`] when the backend refuses.
    async fn fetch_blocks_overlapping(
        &self,
        start_local: chrono::NaiveDateTime,
        end_local: chrono::NaiveDateTime,
    ) -> Result<Vec<CalendarBlock>, CalendarError>;

    /// Create a block on the managed calendar; returns the backend event id.
    ///
    /// # Errors
    ///
    /// Returns a [`CalendarError`] when the backend refuses.
    async fn create_managed_block(
        &self,
        block: &CalendarBlock,
        calendar_name: &str,
    ) -> Result<String, CalendarError>;

    /// Update an existing managed block in place (matched by block id or
    /// backend event id).
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::EventNotFound`] when no such block exists.
    async fn update_managed_block(
        &self,
        block: &CalendarBlock,
        calendar_name: &str,
    ) -> Result<(), CalendarError>;

    /// Delete a managed block by id (and backend event id when known).
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::EventNotFound`] when no such block exists.
    async fn delete_managed_block(
        &self,
        block_id: &str,
        external_event_id: Option<&str>,
        calendar_name: &str,
    ) -> Result<(), CalendarError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CalendarState {
    calendars: Vec<String>,
    blocks: HashMap<String, CalendarBlock>,
    deny_writes: Option<String>,
}

/// In-memory [`CalendarStore`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryCalendarStore {
    state: Mutex<CalendarState>,
}

impl InMemoryCalendarStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `permission_denied`.
    pub async fn deny_writes(&self, reason: &str) {
        self.state.lock().await.deny_writes = Some(reason.to_owned());
    }

    /// Clear a previously injected write denial.
    pub async fn allow_writes(&self) {
        self.state.lock().await.deny_writes = None;
    }

    /// Snapshot of every stored block, unordered (for assertions).
    pub async fn all_blocks(&self) -> Vec<CalendarBlock> {
        self.state.lock().await.blocks.values().cloned().collect()
    }

    /// Seed a block directly, bypassing the capability surface.
    pub async fn seed_block(&self, block: CalendarBlock) {
        self.state
            .lock()
            .await
            .blocks
            .insert(block.block_id.clone(), block);
    }
}

fn matches_calendar(block: &CalendarBlock, calendar_name: &str) -> bool {
    block.managed_by_agent && block.calendar_name == calendar_name
}

#[async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn ensure_managed_calendar(&self, name: &str) -> Result<(), CalendarError> {
        let mut state = self.state.lock().await;
        if !state.calendars.iter().any(|c| c == name) {
            state.calendars.push(name.to_owned());
        }
        Ok(())
    }

    async fn fetch_managed_blocks(
        &self,
        on_date: NaiveDate,
        calendar_name: &str,
    ) -> Result<Vec<CalendarBlock>, CalendarError> {
        let state = self.state.lock().await;
        let mut blocks: Vec<CalendarBlock> = state
            .blocks
            .values()
            .filter(|b| matches_calendar(b, calendar_name) && b.start_local.date() == on_date)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| {
            a.start_local
                .cmp(&b.start_local)
                .then_with(|| a.block_id.cmp(&b.block_id))
        });
        Ok(blocks)
    }

    async fn find_managed_blocks(
        &self,
        fuzzy_title: &str,
        on_date: Option<NaiveDate>,
        calendar_name: &str,
    ) -> Result<Vec<CalendarBlock>, CalendarError> {
        let needle = fuzzy_title.to_lowercase();
        let state = self.state.lock().await;
        let mut blocks: Vec<CalendarBlock> = state
            .blocks
            .values()
            .filter(|b| {
                matches_calendar(b, calendar_name)
                    && b.title.to_lowercase().contains(&needle)
                    && on_date.is_none_or(|d| b.start_local.date() == d)
            })
            .cloned()
            .collect();
        blocks.sort_by(|a, b| {
            a.start_local
                .cmp(&b.start_local)
                .then_with(|| a.block_id.cmp(&b.block_id))
        });
        Ok(blocks)
    }

    async fn fetch_blocks_overlapping(
        &self,
        start_local: chrono::NaiveDateTime,
        end_local: chrono::NaiveDateTime,
    ) -> Result<Vec<CalendarBlock>, CalendarError> {
        let state = self.state.lock().await;
        let mut blocks: Vec<CalendarBlock> = state
            .blocks
            .values()
            .filter(|b| b.start_local < end_local && b.end_local > start_local)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| {
            a.start_local
                .cmp(&b.start_local)
                .then_with(|| a.block_id.cmp(&b.block_id))
        });
        Ok(blocks)
    }

    async fn create_managed_block(
        &self,
        block: &CalendarBlock,
        calendar_name: &str,
    ) -> Result<String, CalendarError> {
        let mut state = self.state.lock().await;
        if let Some(ref reason) = state.deny_writes {
            return Err(CalendarError::PermissionDenied(reason.clone()));
        }
        if !state.calendars.iter().any(|c| c == calendar_name) {
            return Err(CalendarError::CalendarNotAvailable(calendar_name.to_owned()));
        }
        let event_id = format!("evt-{}", Uuid::new_v4());
        let mut stored = block.clone();
        stored.calendar_event_id = Some(event_id.clone());
        stored.calendar_name = calendar_name.to_owned();
        stored.managed_by_agent = true;
        state.blocks.insert(stored.block_id.clone(), stored);
        Ok(event_id)
    }

    async fn update_managed_block(
        &self,
        block: &CalendarBlock,
        calendar_name: &str,
    ) -> Result<(), CalendarError> {
        let mut state = self.state.lock().await;
        if let Some(ref reason) = state.deny_writes {
            return Err(CalendarError::PermissionDenied(reason.clone()));
        }
        let existing = state
            .blocks
            .get(&block.block_id)
            .filter(|b| matches_calendar(b, calendar_name));
        if existing.is_none() {
            return Err(CalendarError::EventNotFound(block.block_id.clone()));
        }
        state.blocks.insert(block.block_id.clone(), block.clone());
        Ok(())
    }

    async fn delete_managed_block(
        &self,
        block_id: &str,
        external_event_id: Option<&str>,
        calendar_name: &str,
    ) -> Result<(), CalendarError> {
        let mut state = self.state.lock().await;
        if let Some(ref reason) = state.deny_writes {
            return Err(CalendarError::PermissionDenied(reason.clone()));
        }
        let by_id = state
            .blocks
            .get(block_id)
            .filter(|b| matches_calendar(b, calendar_name))
            .map(|b| b.block_id.clone());
        let key = by_id.or_else(|| {
            external_event_id.and_then(|evt| {
                state
                    .blocks
                    .values()
                    .find(|b| {
                        matches_calendar(b, calendar_name)
                            && b.calendar_event_id.as_deref() == Some(evt)
                    })
                    .map(|b| b.block_id.clone())
            })
        });
        match key {
            Some(key) => {
                state.blocks.remove(&key);
                Ok(())
            }
            None => Err(CalendarError::EventNotFound(block_id.to_owned())),
        }
    }
}
