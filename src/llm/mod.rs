//! The LLM capability boundary.
//!
//! Exactly two methods: a stateless task extractor and an edit-intent
//! parser. The client is forbidden to perform any mutation — it proposes,
//! the rules engine and services decide. Raw model output passes the
//! [`schema`] gate before the core trusts it; schema violations are dropped.

pub mod fallback;
pub mod schema;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parser::ParsedUpdate;
use crate::rules::EditOperation;
use crate::types::{
    dedupe_key, FeasibilityState, Task, TaskCategory, TaskSource, TaskStatus,
};

/// A proposed task before it acquires an id, a dedupe key, or provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Short human title.
    pub title: String,
    /// Work category.
    pub category: TaskCategory,
    /// Local deadline, when the extractor found one.
    pub due_at_local: Option<NaiveDateTime>,
    /// Estimated total effort in minutes.
    pub estimated_minutes: i64,
    /// Minimum daily allocation in minutes.
    pub min_daily_minutes: i64,
    /// Priority; higher schedules earlier.
    pub priority: i64,
    /// Stress weight in `[0, 1]`.
    pub stress_weight: f64,
}

impl TaskDraft {
    /// Materialise the draft into a task carrying the given provenance.
    pub fn into_task(self, sources: Vec<TaskSource>) -> Task {
        let dedupe_key = dedupe_key(self.category, &self.title, self.due_at_local);
        Task {
            task_id: Uuid::new_v4().to_string(),
            title: self.title,
            category: self.category,
            due_at_local: self.due_at_local,
            estimated_minutes: self.estimated_minutes,
            min_daily_minutes: self.min_daily_minutes,
            priority: self.priority,
            stress_weight: self.stress_weight,
            feasibility_state: FeasibilityState::OnTrack,
            status: TaskStatus::Todo,
            dedupe_key,
            sources,
        }
    }
}

/// Stateless extraction and edit-intent parsing capability.
///
/// Implementations never receive writers and never mutate anything.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Propose tasks from approved update cards.
    ///
    /// Each returned task must reference at least one of the given updates
    /// through its provenance; the caller enforces this.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures; malformed output is a
    /// schema violation and yields an empty result instead.
    async fn extract_tasks(&self, updates: &[ParsedUpdate]) -> anyhow::Result<Vec<Task>>;

    /// Parse free-form edit text into a structured operation pinned to the
    /// revision the caller observed.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures.
    async fn parse_edit_intent(
        &self,
        text: &str,
        expected_plan_revision: i64,
    ) -> anyhow::Result<EditOperation>;
}
