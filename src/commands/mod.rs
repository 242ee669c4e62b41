//! Revision-versioned command service.
//!
//! One command at a time: the whole pipeline — hydrate, parse, validate,
//! mutate, record — runs under a single lock. Grammar commands are parsed
//! directly; anything else is free text handed to the edit-intent parser,
//! and either way the rules engine gates the resulting operation. Every
//! applied create/move persists an undo envelope durable across restarts,
//! and every applied mutation advances the plan revision by exactly one.

pub mod parser;
pub mod undo;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::apply::{ApplyError, PlanApplyService};
use crate::calendar::{CalendarError, CalendarStore};
use crate::config::parse_hhmm;
use crate::llm::LlmClient;
use crate::rules::{EditContext, EditIntent, EditOperation, RulesEngine, Verdict};
use crate::store::{Store, StoreError};
use crate::types::{
    AuditSeverity, CalendarBlock, LockLevel, Operation, OperationStatus, RevisionSummary,
    TaskStatus,
};

use self::parser::{Command, CommandParseError, DayRef};
use self::undo::UndoEnvelope;

/// Maximum retained in-memory undo records.
const UNDO_STACK_LIMIT: usize = 100;

/// Errors that abort command handling outright. Rules verdicts and calendar
/// refusals are replies, not errors.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Store read or write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Envelope encoding failed.
    #[error("serialization error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The structured command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// User-facing reply text.
    pub text: String,
    /// Plan revision after handling (unchanged unless a mutation applied).
    pub plan_revision: i64,
    /// True when the command needs explicit user confirmation.
    pub requires_confirmation: bool,
}

/// One in-memory undo record mirroring a persisted operation row.
#[derive(Debug, Clone)]
struct UndoRecord {
    op_id: String,
    intent: EditIntent,
    envelope: UndoEnvelope,
}

#[derive(Debug, Default)]
struct CommandState {
    /// `None` until hydrated from the store on first use.
    revision: Option<i64>,
    undo_stack: VecDeque<UndoRecord>,
}

/// Handles chat commands against the managed calendar.
pub struct CommandService {
    store: Store,
    calendar: Arc<dyn CalendarStore>,
    llm: Arc<dyn LlmClient>,
    apply: Option<Arc<PlanApplyService>>,
    rules: RulesEngine,
    calendar_name: String,
    state: Mutex<CommandState>,
}

impl std::fmt::Debug for CommandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandService")
            .field("calendar_name", &self.calendar_name)
            .finish_non_exhaustive()
    }
}

impl CommandService {
    /// Build the service over its collaborators. `apply` is optional; when
    /// absent, `regenerate_plan` edits report that regeneration is offline.
    pub fn new(
        store: Store,
        calendar: Arc<dyn CalendarStore>,
        llm: Arc<dyn LlmClient>,
        apply: Option<Arc<PlanApplyService>>,
        calendar_name: String,
    ) -> Self {
        Self {
            store,
            calendar,
            llm,
            apply,
            rules: RulesEngine,
            calendar_name,
            state: Mutex::new(CommandState::default()),
        }
    }

    /// Handle one command line.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails; everything else — parse
    /// problems, rules verdicts, calendar refusals — comes back as a reply.
    pub async fn handle(
        &self,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<CommandReply, CommandError> {
        let mut state = self.state.lock().await;
        let revision = self.hydrate(&mut state).await?;

        let command = match parser::parse(text) {
            Ok(command) => command,
            Err(CommandParseError::UnknownVerb(_)) => {
                // Free text goes to the edit-intent parser; whatever comes
                // back still has to clear the rules engine.
                let edit = match self.llm.parse_edit_intent(text, revision).await {
                    Ok(edit) => edit,
                    Err(e) => {
                        warn!(error = %e, "edit-intent parsing failed");
                        return Ok(CommandReply {
                            text: "Could not interpret that; try `help`.".to_owned(),
                            plan_revision: revision,
                            requires_confirmation: false,
                        });
                    }
                };
                return self.execute(&mut state, edit, now).await;
            }
            Err(e @ CommandParseError::Malformed(_)) => {
                return Ok(CommandReply {
                    text: e.to_string(),
                    plan_revision: revision,
                    requires_confirmation: false,
                });
            }
        };

        match command {
            Command::Help => Ok(CommandReply {
                text: parser::help_text(),
                plan_revision: revision,
                requires_confirmation: false,
            }),
            Command::Today => self.today(revision, now).await,
            Command::Undo => self.undo(&mut state).await,
            Command::Add {
                title,
                minutes,
                day,
                time,
            } => {
                let start = resolve_day(now, day)
                    .and_time(time.unwrap_or_else(default_add_time));
                let end = start
                    .checked_add_signed(chrono::Duration::minutes(minutes))
                    .unwrap_or(start);
                let mut edit = EditOperation::new(EditIntent::CreateBlock, revision);
                edit.fuzzy_title = Some(title);
                edit.start_local = Some(start);
                edit.end_local = Some(end);
                self.execute(&mut state, edit, now).await
            }
            Command::Move {
                title,
                day,
                time,
                minutes,
            } => {
                let start = resolve_day(now, day).and_time(time);
                let mut edit = EditOperation::new(EditIntent::MoveBlock, revision);
                edit.fuzzy_title = Some(title);
                edit.start_local = Some(start);
                edit.end_local = minutes.and_then(|m| {
                    start.checked_add_signed(chrono::Duration::minutes(m))
                });
                self.execute(&mut state, edit, now).await
            }
        }
    }

    /// Submit a pre-built edit (e.g. from the LLM edit-intent parser)
    /// through the same validation and apply pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails.
    pub async fn submit_edit(
        &self,
        edit: EditOperation,
        now: NaiveDateTime,
    ) -> Result<CommandReply, CommandError> {
        let mut state = self.state.lock().await;
        self.hydrate(&mut state).await?;
        self.execute(&mut state, edit, now).await
    }

    /// The revision the service currently holds (hydrating if needed).
    ///
    /// # Errors
    ///
    /// Returns an error when hydration fails.
    pub async fn current_revision(&self) -> Result<i64, CommandError> {
        let mut state = self.state.lock().await;
        self.hydrate(&mut state).await
    }

    /// Hydrate the in-memory revision counter from the store on first use.
    async fn hydrate(&self, state: &mut CommandState) -> Result<i64, CommandError> {
        if let Some(revision) = state.revision {
            return Ok(revision);
        }
        let from_revisions = self.store.latest_revision_id().await?;
        let from_operations = self.store.latest_applied_revision().await?;
        let revision = from_revisions.max(from_operations);
        state.revision = Some(revision);
        Ok(revision)
    }

    // ── Read commands ───────────────────────────────────────────

    async fn today(&self, revision: i64, now: NaiveDateTime) -> Result<CommandReply, CommandError> {
        let date = now.date();
        let blocks = match self
            .calendar
            .fetch_managed_blocks(date, &self.calendar_name)
            .await
        {
            Ok(blocks) => blocks,
            Err(e) => return self.calendar_refusal(revision, "today", &e).await,
        };

        let text = if blocks.is_empty() {
            format!("No blocks planned for {date}.")
        } else {
            let mut lines = vec![format!("Plan for {date} (revision {revision}):")];
            for block in &blocks {
                lines.push(format!(
                    "  {}\u{2013}{} {}",
                    block.start_local.format("%H:%M"),
                    block.end_local.format("%H:%M"),
                    block.title
                ));
            }
            lines.join("\n")
        };
        Ok(CommandReply {
            text,
            plan_revision: revision,
            requires_confirmation: false,
        })
    }

    // ── Edit pipeline ───────────────────────────────────────────

    /// Validate and apply one edit. Target resolution and the non-agent
    /// overlap probe happen here so the rules engine sees real context.
    async fn execute(
        &self,
        state: &mut CommandState,
        mut edit: EditOperation,
        now: NaiveDateTime,
    ) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;

        let needs_target = matches!(
            edit.intent,
            EditIntent::MoveBlock
                | EditIntent::ResizeBlock
                | EditIntent::DeleteBlock
                | EditIntent::MarkDone
        );
        let mut target: Option<CalendarBlock> = None;
        let mut matched_target_count = 0usize;
        if needs_target {
            let needle = edit.fuzzy_title.clone().unwrap_or_default();
            let matches = match self
                .calendar
                .find_managed_blocks(&needle, None, &self.calendar_name)
                .await
            {
                Ok(matches) => matches,
                Err(e) => return self.calendar_refusal(revision, edit.intent.as_str(), &e).await,
            };
            matched_target_count = matches.len();
            if matches.is_empty() {
                return Ok(CommandReply {
                    text: format!("No managed block matching {needle:?}."),
                    plan_revision: revision,
                    requires_confirmation: false,
                });
            }
            target = matches.into_iter().next();
        }

        // Duration defaults to the existing block when the edit left the end
        // open.
        if edit.end_local.is_none() {
            if let (Some(start), Some(ref block)) = (edit.start_local, target.as_ref()) {
                edit.end_local =
                    start.checked_add_signed(chrono::Duration::minutes(block.duration_minutes()));
            }
        }

        // An edit whose window overlaps an event the agent does not own is
        // held for confirmation.
        let mut touches_non_agent = false;
        if let (Some(start), Some(end)) = (edit.start_local, edit.end_local) {
            let overlapping = match self.calendar.fetch_blocks_overlapping(start, end).await {
                Ok(blocks) => blocks,
                Err(e) => return self.calendar_refusal(revision, edit.intent.as_str(), &e).await,
            };
            touches_non_agent = overlapping
                .iter()
                .any(|b| !b.managed_by_agent || b.calendar_name != self.calendar_name);
        }

        let ctx = EditContext {
            current_plan_revision: revision,
            touches_non_agent_managed_event: touches_non_agent,
            matched_target_count,
        };
        match self.rules.validate_edit(&edit, &ctx) {
            Verdict::Rejected(reason) => {
                self.record_verdict(&edit, OperationStatus::Rejected, &reason)
                    .await?;
                Ok(CommandReply {
                    text: format!("Rejected: {reason}."),
                    plan_revision: revision,
                    requires_confirmation: false,
                })
            }
            Verdict::RequiresConfirmation(reason) => {
                self.record_verdict(&edit, OperationStatus::RequiresConfirmation, &reason)
                    .await?;
                let text = if reason == "ambiguous_target" {
                    format!(
                        "Ambiguous match: {matched_target_count} blocks titled {:?}; be more specific.",
                        edit.fuzzy_title.as_deref().unwrap_or("")
                    )
                } else {
                    format!("Needs confirmation: {reason}.")
                };
                Ok(CommandReply {
                    text,
                    plan_revision: revision,
                    requires_confirmation: true,
                })
            }
            Verdict::Approved => match (edit.intent, target) {
                (EditIntent::CreateBlock, _) => self.apply_create(state, &edit).await,
                // A single match is guaranteed here by the ambiguity gate.
                (EditIntent::MoveBlock | EditIntent::ResizeBlock, Some(target)) => {
                    self.apply_move(state, &edit, target).await
                }
                (EditIntent::DeleteBlock, Some(target)) => {
                    self.apply_delete(state, &edit, target).await
                }
                (EditIntent::MarkDone, Some(target)) => {
                    self.apply_mark_done(state, &edit, target).await
                }
                (EditIntent::LockSleep, _) => self.apply_lock_sleep(state, &edit, now).await,
                (EditIntent::RegeneratePlan, _) => {
                    self.apply_regenerate(state, &edit, now).await
                }
                (intent, None) => Ok(CommandReply {
                    text: format!("No target block for {}.", intent.as_str()),
                    plan_revision: revision,
                    requires_confirmation: false,
                }),
            },
        }
    }

    async fn apply_create(
        &self,
        state: &mut CommandState,
        edit: &EditOperation,
    ) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;
        let next_revision = revision.saturating_add(1);
        let (Some(start), Some(end)) = (edit.start_local, edit.end_local) else {
            return Ok(CommandReply {
                text: "Rejected: invalid_or_missing_time_window.".to_owned(),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };
        let title = edit.fuzzy_title.clone().unwrap_or_else(|| "Untitled".to_owned());

        let block = CalendarBlock {
            block_id: Uuid::new_v4().to_string(),
            task_id: None,
            title: title.clone(),
            start_local: start,
            end_local: end,
            calendar_event_id: None,
            calendar_name: self.calendar_name.clone(),
            managed_by_agent: true,
            lock_level: LockLevel::Flexible,
            plan_revision: next_revision,
        };

        let event_id = match self
            .calendar
            .create_managed_block(&block, &self.calendar_name)
            .await
        {
            Ok(event_id) => event_id,
            Err(e) => return self.calendar_refusal(revision, "create_block", &e).await,
        };

        let mut stored = block.clone();
        stored.calendar_event_id = Some(event_id.clone());
        self.store.upsert_block(&stored).await?;

        let envelope = UndoEnvelope::CreatedBlock {
            block_id: block.block_id.clone(),
            calendar_event_id: Some(event_id),
        };
        let op_id = self
            .record_applied(edit, next_revision, envelope.encode()?)
            .await?;
        self.store
            .append_revision(
                "command_add",
                RevisionSummary {
                    created: 1,
                    moved: 0,
                    deleted: 0,
                },
            )
            .await?;
        push_undo(state, UndoRecord {
            op_id,
            intent: EditIntent::CreateBlock,
            envelope,
        });
        state.revision = Some(next_revision);

        info!(title = %title, revision = next_revision, "block added by command");
        Ok(CommandReply {
            text: format!(
                "Added {:?} {}\u{2013}{} (revision {next_revision}).",
                title,
                start.format("%Y-%m-%d %H:%M"),
                end.format("%H:%M")
            ),
            plan_revision: next_revision,
            requires_confirmation: false,
        })
    }

    async fn apply_move(
        &self,
        state: &mut CommandState,
        edit: &EditOperation,
        target: CalendarBlock,
    ) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;
        let next_revision = revision.saturating_add(1);
        let (Some(start), Some(end)) = (edit.start_local, edit.end_local) else {
            return Ok(CommandReply {
                text: "Rejected: invalid_or_missing_time_window.".to_owned(),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };

        let previous = target.clone();
        let mut moved = target;
        moved.start_local = start;
        moved.end_local = end;
        moved.plan_revision = next_revision;

        if let Err(e) = self
            .calendar
            .update_managed_block(&moved, &self.calendar_name)
            .await
        {
            return self.calendar_refusal(revision, "move_block", &e).await;
        }
        self.store.upsert_block(&moved).await?;

        let envelope = UndoEnvelope::MovedBlock { previous };
        let op_id = self
            .record_applied(edit, next_revision, envelope.encode()?)
            .await?;
        self.store
            .append_revision(
                "command_move",
                RevisionSummary {
                    created: 0,
                    moved: 1,
                    deleted: 0,
                },
            )
            .await?;
        push_undo(state, UndoRecord {
            op_id,
            intent: EditIntent::MoveBlock,
            envelope,
        });
        state.revision = Some(next_revision);

        info!(title = %moved.title, revision = next_revision, "block moved by command");
        Ok(CommandReply {
            text: format!(
                "Moved {:?} to {}\u{2013}{} (revision {next_revision}).",
                moved.title,
                start.format("%Y-%m-%d %H:%M"),
                end.format("%H:%M")
            ),
            plan_revision: next_revision,
            requires_confirmation: false,
        })
    }

    async fn apply_delete(
        &self,
        state: &mut CommandState,
        edit: &EditOperation,
        target: CalendarBlock,
    ) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;
        let next_revision = revision.saturating_add(1);

        if let Err(e) = self
            .calendar
            .delete_managed_block(
                &target.block_id,
                target.calendar_event_id.as_deref(),
                &self.calendar_name,
            )
            .await
        {
            return self.calendar_refusal(revision, "delete_block", &e).await;
        }
        self.store.delete_block(&target.block_id).await?;

        // Snapshot for the audit trail; deletes are not undoable.
        self.record_applied(edit, next_revision, serde_json::to_value(&target)?)
            .await?;
        self.store
            .append_revision(
                "command_delete",
                RevisionSummary {
                    created: 0,
                    moved: 0,
                    deleted: 1,
                },
            )
            .await?;
        state.revision = Some(next_revision);

        info!(title = %target.title, revision = next_revision, "block deleted by command");
        Ok(CommandReply {
            text: format!("Deleted {:?} (revision {next_revision}).", target.title),
            plan_revision: next_revision,
            requires_confirmation: false,
        })
    }

    async fn apply_mark_done(
        &self,
        state: &mut CommandState,
        edit: &EditOperation,
        target: CalendarBlock,
    ) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;
        let next_revision = revision.saturating_add(1);

        let Some(task_id) = target.task_id.clone() else {
            return Ok(CommandReply {
                text: format!("No task linked to {:?}.", target.title),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };
        match self.store.set_task_status(&task_id, TaskStatus::Done).await {
            Ok(()) => {}
            Err(StoreError::InvariantViolation(_)) => {
                return Ok(CommandReply {
                    text: format!("Task for {:?} no longer exists.", target.title),
                    plan_revision: revision,
                    requires_confirmation: false,
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.record_applied(
            edit,
            next_revision,
            serde_json::json!({ "task_id": task_id, "status": "done" }),
        )
        .await?;
        self.store
            .append_revision("command_done", RevisionSummary::default())
            .await?;
        state.revision = Some(next_revision);

        info!(task_id = %task_id, revision = next_revision, "task retired by command");
        Ok(CommandReply {
            text: format!("Marked {:?} done (revision {next_revision}).", target.title),
            plan_revision: next_revision,
            requires_confirmation: false,
        })
    }

    /// Pin the sleep window as a locked block; the planner subtracts locked
    /// blocks from its windows, so tonight's plan cannot encroach on it.
    async fn apply_lock_sleep(
        &self,
        state: &mut CommandState,
        edit: &EditOperation,
        now: NaiveDateTime,
    ) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;
        let next_revision = revision.saturating_add(1);

        let Some((ref start_s, ref end_s)) = edit.sleep_window else {
            return Ok(CommandReply {
                text: "Rejected: missing_sleep_window.".to_owned(),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };
        let (Ok((start_h, start_m)), Ok((end_h, end_m))) =
            (parse_hhmm(start_s), parse_hhmm(end_s))
        else {
            self.record_verdict(edit, OperationStatus::Rejected, "invalid_sleep_window")
                .await?;
            return Ok(CommandReply {
                text: "Rejected: invalid_sleep_window.".to_owned(),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };
        let (Some(start_local), Some(end_time)) = (
            now.date().and_hms_opt(start_h, start_m, 0),
            chrono::NaiveTime::from_hms_opt(end_h, end_m, 0),
        ) else {
            return Ok(CommandReply {
                text: "Rejected: invalid_sleep_window.".to_owned(),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };
        // A window whose end precedes its start crosses midnight.
        let end_local = if end_time > start_local.time() {
            now.date().and_time(end_time)
        } else {
            match now.date().succ_opt() {
                Some(next_day) => next_day.and_time(end_time),
                None => start_local,
            }
        };

        let block = CalendarBlock {
            block_id: Uuid::new_v4().to_string(),
            task_id: None,
            title: "Sleep".to_owned(),
            start_local,
            end_local,
            calendar_event_id: None,
            calendar_name: self.calendar_name.clone(),
            managed_by_agent: true,
            lock_level: LockLevel::Locked,
            plan_revision: next_revision,
        };
        let event_id = match self
            .calendar
            .create_managed_block(&block, &self.calendar_name)
            .await
        {
            Ok(event_id) => event_id,
            Err(e) => return self.calendar_refusal(revision, "lock_sleep", &e).await,
        };
        let mut stored = block.clone();
        stored.calendar_event_id = Some(event_id);
        self.store.upsert_block(&stored).await?;

        self.record_applied(edit, next_revision, serde_json::to_value(&stored)?)
            .await?;
        self.store
            .append_revision(
                "command_lock_sleep",
                RevisionSummary {
                    created: 1,
                    moved: 0,
                    deleted: 0,
                },
            )
            .await?;
        state.revision = Some(next_revision);

        info!(start = %start_s, end = %end_s, revision = next_revision, "sleep window locked");
        Ok(CommandReply {
            text: format!("Locked sleep {start_s}\u{2013}{end_s} (revision {next_revision})."),
            plan_revision: next_revision,
            requires_confirmation: false,
        })
    }

    async fn apply_regenerate(
        &self,
        state: &mut CommandState,
        _edit: &EditOperation,
        now: NaiveDateTime,
    ) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;
        let Some(ref apply) = self.apply else {
            return Ok(CommandReply {
                text: "Plan regeneration is not available right now.".to_owned(),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };

        // The apply service records its own revision and operation rows.
        match apply.regenerate(now, "command_regenerate").await {
            Ok(outcome) => {
                state.revision = Some(outcome.revision_id);
                Ok(CommandReply {
                    text: format!(
                        "Plan regenerated: {} created, {} deleted, {} (revision {}).",
                        outcome.created,
                        outcome.deleted,
                        outcome.feasibility.as_str(),
                        outcome.revision_id
                    ),
                    plan_revision: outcome.revision_id,
                    requires_confirmation: false,
                })
            }
            Err(ApplyError::Calendar(e)) => self.calendar_refusal(revision, "regenerate_plan", &e).await,
            Err(ApplyError::Store(e)) => Err(e.into()),
        }
    }

    // ── Undo ────────────────────────────────────────────────────

    async fn undo(&self, state: &mut CommandState) -> Result<CommandReply, CommandError> {
        let revision = self.hydrate(state).await?;

        // In-memory stack first, then the durable operation log (restart
        // path).
        let record = match state.undo_stack.pop_back() {
            Some(record) => Some(record),
            None => self
                .store
                .latest_undoable_operation()
                .await?
                .and_then(|op| {
                    let envelope = UndoEnvelope::decode(&op.result_json)?;
                    let intent = match op.intent.as_str() {
                        "create_block" => EditIntent::CreateBlock,
                        _ => EditIntent::MoveBlock,
                    };
                    Some(UndoRecord {
                        op_id: op.op_id,
                        intent,
                        envelope,
                    })
                }),
        };
        let Some(record) = record else {
            return Ok(CommandReply {
                text: "Nothing to undo.".to_owned(),
                plan_revision: revision,
                requires_confirmation: false,
            });
        };

        let summary = match &record.envelope {
            UndoEnvelope::CreatedBlock {
                block_id,
                calendar_event_id,
            } => {
                match self
                    .calendar
                    .delete_managed_block(
                        block_id,
                        calendar_event_id.as_deref(),
                        &self.calendar_name,
                    )
                    .await
                {
                    Ok(()) => {}
                    Err(CalendarError::EventNotFound(_)) => {
                        // Already gone — the undo still completes.
                        warn!(block_id = %block_id, "undo target already absent");
                    }
                    Err(e) => {
                        // Put the record back so a later retry can succeed.
                        push_undo(state, record.clone());
                        return self.calendar_refusal(revision, "undo", &e).await;
                    }
                }
                self.store.delete_block(block_id).await?;
                RevisionSummary {
                    created: 0,
                    moved: 0,
                    deleted: 1,
                }
            }
            UndoEnvelope::MovedBlock { previous } => {
                if let Err(e) = self
                    .calendar
                    .update_managed_block(previous, &self.calendar_name)
                    .await
                {
                    push_undo(state, record.clone());
                    return self.calendar_refusal(revision, "undo", &e).await;
                }
                self.store.upsert_block(previous).await?;
                RevisionSummary {
                    created: 0,
                    moved: 1,
                    deleted: 0,
                }
            }
        };

        self.store.mark_operation_undone(&record.op_id).await?;
        let next_revision = self.store.append_revision("undo", summary).await?;
        state.revision = Some(next_revision);

        self.store
            .audit(
                "command",
                AuditSeverity::Info,
                "undo applied",
                serde_json::json!({
                    "op_id": record.op_id,
                    "intent": record.intent.as_str(),
                    "revision": next_revision,
                }),
            )
            .await?;

        Ok(CommandReply {
            text: format!(
                "Undid last {} (revision {next_revision}).",
                record.intent.as_str()
            ),
            plan_revision: next_revision,
            requires_confirmation: false,
        })
    }

    // ── Recording ───────────────────────────────────────────────

    /// Record an applied operation. For create/move, `result_json` is the
    /// undo envelope; for the other intents it is an audit snapshot (the
    /// undo query never selects those).
    async fn record_applied(
        &self,
        edit: &EditOperation,
        applied_revision: i64,
        result_json: serde_json::Value,
    ) -> Result<String, CommandError> {
        let op_id = Uuid::new_v4().to_string();
        self.store
            .insert_operation(&Operation {
                op_id: op_id.clone(),
                expected_plan_revision: edit.expected_plan_revision,
                applied_revision: Some(applied_revision),
                intent: edit.intent.as_str().to_owned(),
                status: OperationStatus::Applied,
                payload_json: serde_json::to_value(edit)?,
                result_json,
                created_at_utc: Utc::now(),
            })
            .await?;
        self.store
            .audit(
                "command",
                AuditSeverity::Info,
                "edit applied",
                serde_json::json!({
                    "op_id": op_id,
                    "intent": edit.intent.as_str(),
                    "revision": applied_revision,
                }),
            )
            .await?;
        Ok(op_id)
    }

    async fn record_verdict(
        &self,
        edit: &EditOperation,
        status: OperationStatus,
        reason: &str,
    ) -> Result<(), CommandError> {
        self.store
            .insert_operation(&Operation {
                op_id: Uuid::new_v4().to_string(),
                expected_plan_revision: edit.expected_plan_revision,
                applied_revision: None,
                intent: edit.intent.as_str().to_owned(),
                status,
                payload_json: serde_json::to_value(edit)?,
                result_json: serde_json::json!({ "reason": reason }),
                created_at_utc: Utc::now(),
            })
            .await?;
        self.store
            .audit(
                "command",
                AuditSeverity::Info,
                "edit gated",
                serde_json::json!({
                    "intent": edit.intent.as_str(),
                    "status": status.as_str(),
                    "reason": reason,
                }),
            )
            .await?;
        Ok(())
    }

    /// A calendar refusal becomes a reply, never a crash; writes stay
    /// blocked until the operator recovers access.
    async fn calendar_refusal(
        &self,
        revision: i64,
        during: &str,
        error: &CalendarError,
    ) -> Result<CommandReply, CommandError> {
        warn!(during, error = %error, "calendar refused");
        self.store
            .audit(
                "command",
                AuditSeverity::Warning,
                "calendar refusal",
                serde_json::json!({ "during": during, "error": error.to_string() }),
            )
            .await?;
        Ok(CommandReply {
            text: format!("Calendar error during {during}: {error}"),
            plan_revision: revision,
            requires_confirmation: false,
        })
    }
}

fn push_undo(state: &mut CommandState, record: UndoRecord) {
    state.undo_stack.push_back(record);
    while state.undo_stack.len() > UNDO_STACK_LIMIT {
        state.undo_stack.pop_front();
    }
}

fn resolve_day(now: NaiveDateTime, day: DayRef) -> chrono::NaiveDate {
    match day {
        DayRef::Today => now.date(),
        DayRef::Tomorrow => now.date().succ_opt().unwrap_or_else(|| now.date()),
    }
}

/// Default time of day for `add` without an explicit time.
fn default_add_time() -> chrono::NaiveTime {
    chrono::NaiveTime::from_hms_opt(19, 0, 0).unwrap_or(chrono::NaiveTime::MIN)
}
