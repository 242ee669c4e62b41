//! Policy firewall: every edit operation and every extracted update passes
//! through here before any side effect.
//!
//! Both validators are total functions returning verdict values — a verdict
//! is never an error. Check order is fixed and observable in the reasons.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::UpdateCard;

// ---------------------------------------------------------------------------
// Edit operations
// ---------------------------------------------------------------------------

/// What an edit wants to do to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditIntent {
    CreateBlock,
    MoveBlock,
    ResizeBlock,
    DeleteBlock,
    MarkDone,
    LockSleep,
    RegeneratePlan,
}

impl EditIntent {
    /// Stable string name used in operation rows and replies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateBlock => "create_block",
            Self::MoveBlock => "move_block",
            Self::ResizeBlock => "resize_block",
            Self::DeleteBlock => "delete_block",
            Self::MarkDone => "mark_done",
            Self::LockSleep => "lock_sleep",
            Self::RegeneratePlan => "regenerate_plan",
        }
    }
}

/// A structured intent to mutate plan state, subject to validation.
///
/// Produced by the command parser or by the LLM edit-intent parser; either
/// way it is inert until the rules engine approves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOperation {
    /// What to do.
    pub intent: EditIntent,
    /// Revision the caller observed; stale revisions are rejected.
    pub expected_plan_revision: i64,
    /// Fuzzy title identifying the target block, for move/delete/done.
    pub fuzzy_title: Option<String>,
    /// Backend event id identifying the target block exactly.
    pub calendar_event_id: Option<String>,
    /// New window start, for create/move/resize.
    pub start_local: Option<NaiveDateTime>,
    /// New window end.
    pub end_local: Option<NaiveDateTime>,
    /// Sleep window `(start, end)` as `HH:MM` strings, for lock_sleep.
    pub sleep_window: Option<(String, String)>,
    /// Caller already knows confirmation is needed (e.g. ambiguous parse).
    pub requires_confirmation: bool,
    /// Why confirmation is needed, when the caller knows.
    pub ambiguity_reason: Option<String>,
}

impl EditOperation {
    /// A bare operation with nothing but intent and expected revision.
    pub fn new(intent: EditIntent, expected_plan_revision: i64) -> Self {
        Self {
            intent,
            expected_plan_revision,
            fuzzy_title: None,
            calendar_event_id: None,
            start_local: None,
            end_local: None,
            sleep_window: None,
            requires_confirmation: false,
            ambiguity_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Outcome of a validation. Reasons are stable snake_case identifiers that
/// surface verbatim in command replies and audit rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum Verdict {
    /// Side effect may proceed.
    Approved,
    /// User must confirm before the side effect runs.
    RequiresConfirmation(String),
    /// Side effect must not run.
    Rejected(String),
}

impl Verdict {
    /// True for [`Verdict::Approved`].
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Context the command service assembles before validating an edit.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditContext {
    /// The store-backed revision counter right now.
    pub current_plan_revision: i64,
    /// The edit would touch an event the agent does not manage.
    pub touches_non_agent_managed_event: bool,
    /// How many blocks matched the target identifier.
    pub matched_target_count: usize,
}

/// Context for validating an extracted update.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext {
    /// Confidence gate below which extraction needs confirmation.
    pub threshold: f64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The policy firewall. Stateless; both validators are pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesEngine;

impl RulesEngine {
    /// Validate an edit operation against current plan state.
    ///
    /// Checks run in a fixed order: revision staleness, non-agent targets,
    /// target ambiguity, caller-flagged confirmation, then intent-specific
    /// shape requirements.
    pub fn validate_edit(&self, edit: &EditOperation, ctx: &EditContext) -> Verdict {
        if edit.expected_plan_revision != ctx.current_plan_revision {
            return Verdict::Rejected("stale_plan_revision".to_owned());
        }
        if ctx.touches_non_agent_managed_event {
            return Verdict::RequiresConfirmation("non_agent_event".to_owned());
        }
        if ctx.matched_target_count > 1 {
            return Verdict::RequiresConfirmation("ambiguous_target".to_owned());
        }
        if edit.requires_confirmation {
            let reason = edit
                .ambiguity_reason
                .clone()
                .unwrap_or_else(|| "explicit_confirmation_flag".to_owned());
            return Verdict::RequiresConfirmation(reason);
        }

        match edit.intent {
            EditIntent::CreateBlock | EditIntent::MoveBlock | EditIntent::ResizeBlock => {
                match (edit.start_local, edit.end_local) {
                    (Some(start), Some(end)) if start < end => Verdict::Approved,
                    _ => Verdict::Rejected("invalid_or_missing_time_window".to_owned()),
                }
            }
            EditIntent::DeleteBlock | EditIntent::MarkDone => {
                let has_event_id = edit.calendar_event_id.is_some();
                let has_title = edit
                    .fuzzy_title
                    .as_deref()
                    .is_some_and(|t| !t.trim().is_empty());
                if has_event_id || has_title {
                    Verdict::Approved
                } else {
                    Verdict::Rejected("missing_target_identifier".to_owned())
                }
            }
            EditIntent::LockSleep => {
                if edit.sleep_window.is_some() {
                    Verdict::Approved
                } else {
                    Verdict::Rejected("missing_sleep_window".to_owned())
                }
            }
            EditIntent::RegeneratePlan => Verdict::Approved,
        }
    }

    /// Validate an extracted update against the confidence gate.
    pub fn validate_update(&self, update: &UpdateCard, ctx: &UpdateContext) -> Verdict {
        if !(0.0..=1.0).contains(&update.parse_confidence) {
            return Verdict::Rejected("confidence_out_of_range".to_owned());
        }
        if update.subject.trim().is_empty() {
            return Verdict::Rejected("blank_subject".to_owned());
        }
        if update.parse_confidence < ctx.threshold {
            return Verdict::RequiresConfirmation("below_confidence_threshold".to_owned());
        }
        if update.requires_confirmation {
            return Verdict::RequiresConfirmation("parser_flagged".to_owned());
        }
        Verdict::Approved
    }
}
