//! Plan-diff/apply engine: reconciles desired blocks against the managed
//! calendar.
//!
//! Moves are represented as delete+create at this layer; the diff key is
//! minute-granular, so an unchanged block survives regeneration untouched.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::calendar::{CalendarError, CalendarStore};
use crate::config::PlannerConfig;
use crate::planner::{self, PlannerInput};
use crate::rules::EditIntent;
use crate::store::{Store, StoreError};
use crate::types::{
    AuditSeverity, FeasibilityState, LockLevel, Operation, OperationStatus, RevisionSummary,
};

/// Errors that abort a regeneration outright. Per-block apply failures do
/// not abort; they are audited and counted instead.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Store read or write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The calendar could not even be read.
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// What one regeneration did.
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerateOutcome {
    /// Revision recorded for this regeneration.
    pub revision_id: i64,
    /// Blocks created on the calendar.
    pub created: i64,
    /// Blocks deleted from the calendar.
    pub deleted: i64,
    /// Planner verdict for the day.
    pub feasibility: FeasibilityState,
    /// Tasks that did not fully fit.
    pub unscheduled_task_ids: Vec<String>,
}

/// Diffs desired blocks against observed managed blocks and applies the
/// difference.
pub struct PlanApplyService {
    store: Store,
    calendar: Arc<dyn CalendarStore>,
    constraints: PlannerConfig,
    calendar_name: String,
}

impl std::fmt::Debug for PlanApplyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanApplyService")
            .field("calendar_name", &self.calendar_name)
            .finish_non_exhaustive()
    }
}

impl PlanApplyService {
    /// Build the service over its collaborators.
    pub fn new(
        store: Store,
        calendar: Arc<dyn CalendarStore>,
        constraints: PlannerConfig,
        calendar_name: String,
    ) -> Self {
        Self {
            store,
            calendar,
            constraints,
            calendar_name,
        }
    }

    /// Regenerate the plan for `now`'s date and reconcile the calendar.
    ///
    /// # Errors
    ///
    /// Returns an error when the store or the calendar cannot be read, or
    /// when the revision row cannot be written. Individual block mutations
    /// that fail are audited and skipped.
    pub async fn regenerate(
        &self,
        now: NaiveDateTime,
        trigger: &str,
    ) -> Result<RegenerateOutcome, ApplyError> {
        let date = now.date();
        let tasks = self.store.list_active_tasks().await?;
        let observed = self
            .calendar
            .fetch_managed_blocks(date, &self.calendar_name)
            .await?;

        let next_revision = self.store.latest_revision_id().await?.saturating_add(1);
        let outcome = planner::plan(&PlannerInput {
            date,
            tasks,
            existing_blocks: observed.clone(),
            constraints: self.constraints.clone(),
            plan_revision: next_revision,
            calendar_name: self.calendar_name.clone(),
        });

        let desired_keys: HashSet<String> =
            outcome.blocks.iter().map(|b| b.diff_key()).collect();
        let observed_keys: HashSet<String> = observed.iter().map(|b| b.diff_key()).collect();

        // Locked blocks were subtracted from the planner's windows, not
        // replanned, so they are never deletion candidates.
        let mut deleted: i64 = 0;
        for block in observed
            .iter()
            .filter(|b| b.lock_level == LockLevel::Flexible)
            .filter(|b| !desired_keys.contains(&b.diff_key()))
        {
            match self
                .calendar
                .delete_managed_block(
                    &block.block_id,
                    block.calendar_event_id.as_deref(),
                    &self.calendar_name,
                )
                .await
            {
                Ok(()) => {
                    self.store.delete_block(&block.block_id).await?;
                    deleted = deleted.saturating_add(1);
                }
                Err(e) => {
                    warn!(block_id = %block.block_id, error = %e, "plan apply delete failed");
                    self.store
                        .audit(
                            "plan_apply",
                            AuditSeverity::Warning,
                            "delete failed",
                            serde_json::json!({
                                "block_id": block.block_id,
                                "error": e.to_string(),
                            }),
                        )
                        .await?;
                }
            }
        }

        let mut created: i64 = 0;
        for block in outcome
            .blocks
            .iter()
            .filter(|b| !observed_keys.contains(&b.diff_key()))
        {
            match self
                .calendar
                .create_managed_block(block, &self.calendar_name)
                .await
            {
                Ok(event_id) => {
                    let mut stored = block.clone();
                    stored.calendar_event_id = Some(event_id);
                    self.store.upsert_block(&stored).await?;
                    created = created.saturating_add(1);
                }
                Err(e) => {
                    warn!(title = %block.title, error = %e, "plan apply create failed");
                    self.store
                        .audit(
                            "plan_apply",
                            AuditSeverity::Warning,
                            "create failed",
                            serde_json::json!({
                                "title": block.title,
                                "start_local": block.start_local.to_string(),
                                "error": e.to_string(),
                            }),
                        )
                        .await?;
                }
            }
        }

        let revision_id = self
            .store
            .append_revision(
                trigger,
                RevisionSummary {
                    created,
                    moved: 0,
                    deleted,
                },
            )
            .await?;

        self.store
            .insert_operation(&Operation {
                op_id: Uuid::new_v4().to_string(),
                expected_plan_revision: revision_id.saturating_sub(1),
                applied_revision: Some(revision_id),
                intent: EditIntent::RegeneratePlan.as_str().to_owned(),
                status: OperationStatus::Applied,
                payload_json: serde_json::json!({ "trigger": trigger }),
                result_json: serde_json::json!({
                    "feasibility": outcome.feasibility.as_str(),
                    "created": created,
                    "deleted": deleted,
                    "unscheduled_task_ids": outcome.unscheduled_task_ids,
                }),
                created_at_utc: Utc::now(),
            })
            .await?;

        info!(
            revision = revision_id,
            created,
            deleted,
            feasibility = outcome.feasibility.as_str(),
            trigger,
            "plan regenerated"
        );

        Ok(RegenerateOutcome {
            revision_id,
            created,
            deleted,
            feasibility: outcome.feasibility,
            unscheduled_task_ids: outcome.unscheduled_task_ids,
        })
    }
}
