//! Durable undo envelopes.
//!
//! An envelope is persisted in the operation row's `result_json` at apply
//! time and is sufficient on its own to invert the mutation — including
//! after a process restart.

use serde::{Deserialize, Serialize};

use crate::types::CalendarBlock;

/// Reversible description of one applied mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoEnvelope {
    /// A block was created; undo deletes it.
    CreatedBlock {
        /// The created block's id.
        block_id: String,
        /// Backend event id, when the calendar returned one.
        #[serde(skip_serializing_if = "Option::is_none")]
        calendar_event_id: Option<String>,
    },
    /// A block was moved; undo restores the prior snapshot byte-for-byte.
    MovedBlock {
        /// Full snapshot of the block before the move.
        previous: CalendarBlock,
    },
}

impl UndoEnvelope {
    /// Encode for the operation row.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails (never for these shapes).
    pub fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Decode from an operation row. `None` for foreign or garbled payloads.
    pub fn decode(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
