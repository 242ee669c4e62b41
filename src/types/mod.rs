//! Core domain types shared across the store, pipeline, planner, and
//! command service.
//!
//! Enums that are persisted carry `as_str`/`parse` codec pairs so the SQLite
//! representation stays an explicit, stable string rather than a serde
//! artifact.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error raised when a persisted string does not map back onto an enum.
#[derive(Debug, thiserror::Error)]
#[error("invalid {field} value: {value:?}")]
pub struct InvalidEnum {
    /// Which field contained the bad value.
    pub field: &'static str,
    /// The unexpected value.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Update cards
// ---------------------------------------------------------------------------

/// Where an inbound message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Gmail REST account.
    Gmail,
    /// Microsoft Graph (Outlook) account.
    Outlook,
    /// UBLearns notification delivered over email.
    UblearnsEmail,
    /// Piazza notification delivered over email.
    PiazzaEmail,
}

impl Source {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
            Self::UblearnsEmail => "ublearns_email",
            Self::PiazzaEmail => "piazza_email",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised source.
    pub fn parse(s: &str) -> Result<Self, InvalidEnum> {
        match s {
            "gmail" => Ok(Self::Gmail),
            "outlook" => Ok(Self::Outlook),
            "ublearns_email" => Ok(Self::UblearnsEmail),
            "piazza_email" => Ok(Self::PiazzaEmail),
            other => Err(InvalidEnum {
                field: "source",
                value: other.to_owned(),
            }),
        }
    }
}

/// How the parser produced an update card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserMethod {
    /// Deterministic rule-based extraction.
    RuleBased,
    /// LLM fallback extraction.
    LlmFallback,
}

impl ParserMethod {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::LlmFallback => "llm_fallback",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised parser method.
    pub fn parse(s: &str) -> Result<Self, InvalidEnum> {
        match s {
            "rule_based" => Ok(Self::RuleBased),
            "llm_fallback" => Ok(Self::LlmFallback),
            other => Err(InvalidEnum {
                field: "parser_method",
                value: other.to_owned(),
            }),
        }
    }
}

/// One normalized inbound message — the parser's atomic output.
///
/// Unique by `(source, provider_message_id)`; created once by ingestion,
/// never mutated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCard {
    /// Stable identifier (uuid v4, assigned at parse time).
    pub update_id: String,
    /// Owning account.
    pub account_id: String,
    /// Message source.
    pub source: Source,
    /// Provider-assigned message id (synthetic `-N` suffix for digest fan-out).
    pub provider_message_id: String,
    /// Provider thread/conversation id, when known.
    pub provider_thread_id: Option<String>,
    /// When the provider received the message.
    pub received_at_utc: DateTime<Utc>,
    /// Sender address.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body_text: String,
    /// Ordered list of links found in the body.
    pub links: Vec<String>,
    /// Ordered list of extracted tags (`course:CSE312`, `type:assignment`, ...).
    pub tags: Vec<String>,
    /// How the card was produced.
    pub parser_method: ParserMethod,
    /// Parser confidence in `[0, 1]`.
    pub parse_confidence: f64,
    /// Evidence strings supporting the extraction.
    pub evidence: Vec<String>,
    /// Whether acting on this card needs explicit user confirmation.
    pub requires_confirmation: bool,
    /// SHA-256 of `body_text`, stable across runs.
    pub content_hash: String,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Category of user work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Assignment,
    Quiz,
    EmailReply,
    Application,
    Leetcode,
    Project,
    Admin,
}

impl TaskCategory {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Quiz => "quiz",
            Self::EmailReply => "email_reply",
            Self::Application => "application",
            Self::Leetcode => "leetcode",
            Self::Project => "project",
            Self::Admin => "admin",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised category.
    pub fn parse(s: &str) -> Result<Self, InvalidEnum> {
        match s {
            "assignment" => Ok(Self::Assignment),
            "quiz" => Ok(Self::Quiz),
            "email_reply" => Ok(Self::EmailReply),
            "application" => Ok(Self::Application),
            "leetcode" => Ok(Self::Leetcode),
            "project" => Ok(Self::Project),
            "admin" => Ok(Self::Admin),
            other => Err(InvalidEnum {
                field: "category",
                value: other.to_owned(),
            }),
        }
    }
}

/// Planner verdict on whether a task can still land before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeasibilityState {
    OnTrack,
    AtRisk,
    Infeasible,
}

impl FeasibilityState {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "on_track",
            Self::AtRisk => "at_risk",
            Self::Infeasible => "infeasible",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised feasibility state.
    pub fn parse(s: &str) -> Result<Self, InvalidEnum> {
        match s {
            "on_track" => Ok(Self::OnTrack),
            "at_risk" => Ok(Self::AtRisk),
            "infeasible" => Ok(Self::Infeasible),
            other => Err(InvalidEnum {
                field: "feasibility_state",
                value: other.to_owned(),
            }),
        }
    }
}

/// Task lifecycle status. Tasks are retired (done/ignored), never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Ignored,
}

impl TaskStatus {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Ignored => "ignored",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, InvalidEnum> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "ignored" => Ok(Self::Ignored),
            other => Err(InvalidEnum {
                field: "status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Provenance triple linking a task back to the message(s) that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSource {
    /// Message source.
    pub source: Source,
    /// Owning account.
    pub account_id: String,
    /// Provider message id.
    pub provider_message_id: String,
    /// Extraction confidence for this source.
    pub confidence: f64,
}

/// One unit of user work with scheduling metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier (uuid v4).
    pub task_id: String,
    /// Short human title.
    pub title: String,
    /// Work category.
    pub category: TaskCategory,
    /// Local wall-clock deadline, when known.
    pub due_at_local: Option<NaiveDateTime>,
    /// Estimated total effort in minutes.
    pub estimated_minutes: i64,
    /// Minimum minutes the planner should allocate per day.
    pub min_daily_minutes: i64,
    /// Priority; higher schedules earlier.
    pub priority: i64,
    /// Stress weight in `[0, 1]`; heavier tasks are penalised in scoring.
    pub stress_weight: f64,
    /// Planner verdict.
    pub feasibility_state: FeasibilityState,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Dedupe key: `category | lowercase(title) | (due ISO-8601 | "none")`.
    pub dedupe_key: String,
    /// Provenance rows.
    pub sources: Vec<TaskSource>,
}

/// Build the unique dedupe key for a task.
pub fn dedupe_key(category: TaskCategory, title: &str, due_at_local: Option<NaiveDateTime>) -> String {
    let due = due_at_local
        .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| "none".to_owned());
    format!("{}|{}|{}", category.as_str(), title.to_lowercase(), due)
}

// ---------------------------------------------------------------------------
// Calendar blocks
// ---------------------------------------------------------------------------

/// Whether a block may be rearranged by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockLevel {
    Flexible,
    Locked,
}

impl LockLevel {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flexible => "flexible",
            Self::Locked => "locked",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised lock level.
    pub fn parse(s: &str) -> Result<Self, InvalidEnum> {
        match s {
            "flexible" => Ok(Self::Flexible),
            "locked" => Ok(Self::Locked),
            other => Err(InvalidEnum {
                field: "lock_level",
                value: other.to_owned(),
            }),
        }
    }
}

/// A concrete time range placed on (or observed from) a calendar.
///
/// The agent only mutates blocks where `managed_by_agent` is true and
/// `calendar_name` matches the configured managed calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarBlock {
    /// Stable identifier (uuid v4).
    pub block_id: String,
    /// Task this block works on, if any.
    pub task_id: Option<String>,
    /// Display title.
    pub title: String,
    /// Local wall-clock start (strictly before `end_local`).
    pub start_local: NaiveDateTime,
    /// Local wall-clock end.
    pub end_local: NaiveDateTime,
    /// Backend event id, once the block exists on the calendar.
    pub calendar_event_id: Option<String>,
    /// Calendar the block lives on.
    pub calendar_name: String,
    /// Whether the agent created and owns this block.
    pub managed_by_agent: bool,
    /// Rearrangement policy.
    pub lock_level: LockLevel,
    /// Plan revision at which the block was created.
    pub plan_revision: i64,
}

impl CalendarBlock {
    /// Minutes between start and end (zero if the range is inverted).
    pub fn duration_minutes(&self) -> i64 {
        self.end_local
            .signed_duration_since(self.start_local)
            .num_minutes()
            .max(0)
    }

    /// Diff key `title | floor(start_epoch/60) | floor(end_epoch/60)`.
    ///
    /// The naive local timestamps are interpreted as UTC on both sides of the
    /// diff, so the key is independent of the host timezone.
    pub fn diff_key(&self) -> String {
        let start = self.start_local.and_utc().timestamp().div_euclid(60);
        let end = self.end_local.and_utc().timestamp().div_euclid(60);
        format!("{}|{}|{}", self.title, start, end)
    }
}

// ---------------------------------------------------------------------------
// Revisions and operations
// ---------------------------------------------------------------------------

/// Summary of what a plan mutation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub created: i64,
    pub moved: i64,
    pub deleted: i64,
}

/// One row of the monotonic plan-revision ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRevision {
    /// Monotonic revision id.
    pub revision_id: i64,
    /// What caused the mutation (`gmail_sync`, `command_add`, `undo`, ...).
    pub trigger: String,
    /// Change counts.
    pub summary: RevisionSummary,
    /// When the revision was recorded.
    pub created_at_utc: DateTime<Utc>,
}

/// Outcome of an attempted edit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Applied,
    Rejected,
    RequiresConfirmation,
    Undone,
}

impl OperationStatus {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Rejected => "rejected",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::Undone => "undone",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, InvalidEnum> {
        match s {
            "applied" => Ok(Self::Applied),
            "rejected" => Ok(Self::Rejected),
            "requires_confirmation" => Ok(Self::RequiresConfirmation),
            "undone" => Ok(Self::Undone),
            other => Err(InvalidEnum {
                field: "operation_status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Record of an attempted edit, durable before its side effect is visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Stable identifier (uuid v4).
    pub op_id: String,
    /// Revision the edit was validated against.
    pub expected_plan_revision: i64,
    /// Revision written by the edit, when applied.
    pub applied_revision: Option<i64>,
    /// Edit intent (`create_block`, `move_block`, ...).
    pub intent: String,
    /// Outcome.
    pub status: OperationStatus,
    /// Opaque request payload.
    pub payload_json: serde_json::Value,
    /// Opaque result payload; carries the undo envelope for applied
    /// create/move operations.
    pub result_json: serde_json::Value,
    /// When the operation was recorded.
    pub created_at_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cursors, accounts, audit
// ---------------------------------------------------------------------------

/// Opaque per-`(provider, account)` resume position.
///
/// Tuple-ordered by `(primary, secondary)`. Gmail stores
/// `internalDate` seconds in `primary`; Outlook stores the ISO-8601
/// `receivedDateTime`. Both store the message id in `secondary`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderCursor {
    pub primary: String,
    pub secondary: String,
}

impl ProviderCursor {
    /// Build a cursor from its two components.
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// True when both components are empty (no progress recorded yet).
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }
}

/// One configured mail account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Provider short name (`gmail` or `outlook`).
    pub provider: String,
    /// Stable account identifier.
    pub account_id: String,
    /// Mailbox address, for display and credential lookup.
    pub email: String,
    /// Whether the coordinator should sync this account.
    pub enabled: bool,
}

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl AuditSeverity {
    /// String representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A normalized inbound message handed to the parser pipeline.
///
/// Provider clients produce these; the shape is provider-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Provider message id.
    pub message_id: String,
    /// Thread/conversation id, when the provider exposes one.
    pub thread_id: Option<String>,
    /// Receive instant in UTC.
    pub received_at_utc: DateTime<Utc>,
    /// Sender address.
    pub from_address: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body_text: String,
    /// Links found in the body.
    pub links: Vec<String>,
}
