//! Deterministic rule-based extractor used when no LLM runtime is attached.
//!
//! Derives tasks purely from the parser's rule-extracted fields — template,
//! tags, and due-date phrase. Injection-resistant by construction: message
//! text never steers anything beyond the matched patterns.

use async_trait::async_trait;

use crate::parser::{dates, ParsedUpdate};
use crate::rules::{EditIntent, EditOperation};
use crate::types::{Task, TaskCategory, TaskSource};

use super::LlmClient;

/// Rule-based [`LlmClient`] with no model behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    fn draft_from(update: &ParsedUpdate) -> Option<super::TaskDraft> {
        let card = &update.card;
        let category = categorize(card.tags.iter().map(String::as_str), &update.template)?;

        let due_at_local = update
            .due_phrase
            .as_deref()
            .and_then(|phrase| dates::parse_due_phrase(phrase, reference_date(card)));

        // A course tag makes the title self-describing even out of context.
        let course = card
            .tags
            .iter()
            .find_map(|t| t.strip_prefix("course:"))
            .map(str::to_owned);
        let subject = card.subject.trim();
        let title = match course {
            Some(code) if !subject.to_uppercase().contains(&code) => {
                format!("{code}: {subject}")
            }
            _ => subject.to_owned(),
        };

        let (estimated_minutes, min_daily_minutes, priority, stress_weight) = defaults(category);
        Some(super::TaskDraft {
            title,
            category,
            due_at_local,
            estimated_minutes,
            min_daily_minutes,
            priority,
            stress_weight,
        })
    }
}

#[async_trait]
impl LlmClient for RuleBasedExtractor {
    async fn extract_tasks(&self, updates: &[ParsedUpdate]) -> anyhow::Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for update in updates {
            let Some(draft) = Self::draft_from(update) else {
                continue;
            };
            // Every client's output passes the same shape gate, this one's
            // included.
            let raw = serde_json::to_value(vec![&draft]).unwrap_or(serde_json::Value::Null);
            let source = TaskSource {
                source: update.card.source,
                account_id: update.card.account_id.clone(),
                provider_message_id: update.card.provider_message_id.clone(),
                confidence: update.card.parse_confidence,
            };
            for gated in super::schema::decode_task_drafts(&raw) {
                tasks.push(gated.into_task(vec![source.clone()]));
            }
        }
        Ok(tasks)
    }

    async fn parse_edit_intent(
        &self,
        text: &str,
        expected_plan_revision: i64,
    ) -> anyhow::Result<EditOperation> {
        // Without a model, free text cannot be interpreted safely; hand back
        // an operation the rules engine will hold for confirmation.
        let mut edit = EditOperation::new(EditIntent::RegeneratePlan, expected_plan_revision);
        edit.requires_confirmation = true;
        edit.ambiguity_reason = Some("unparsed_free_text".to_owned());
        edit.fuzzy_title = Some(text.trim().to_owned());
        Ok(edit)
    }
}

/// Category from type tags first, then template family.
fn categorize<'a>(
    tags: impl Iterator<Item = &'a str>,
    template: &str,
) -> Option<TaskCategory> {
    let mut type_tag = None;
    for tag in tags {
        match tag {
            "type:assignment" => return Some(TaskCategory::Assignment),
            "type:quiz" => type_tag = type_tag.or(Some(TaskCategory::Quiz)),
            "type:response_required" => type_tag = type_tag.or(Some(TaskCategory::EmailReply)),
            "type:announcement" => type_tag = type_tag.or(Some(TaskCategory::Admin)),
            "type:untrusted_source" => return None,
            _ => {}
        }
    }
    if let Some(category) = type_tag {
        return Some(category);
    }
    if template.starts_with("ublearns_assignment") {
        return Some(TaskCategory::Assignment);
    }
    if template.starts_with("ublearns_quiz") {
        return Some(TaskCategory::Quiz);
    }
    if template.starts_with("piazza") {
        return Some(TaskCategory::EmailReply);
    }
    None
}

/// Per-category effort and weight defaults.
fn defaults(category: TaskCategory) -> (i64, i64, i64, f64) {
    match category {
        TaskCategory::Assignment => (120, 45, 3, 0.7),
        TaskCategory::Quiz => (60, 30, 3, 0.6),
        TaskCategory::Project => (180, 60, 2, 0.6),
        TaskCategory::Application => (45, 30, 2, 0.4),
        TaskCategory::EmailReply => (20, 20, 2, 0.2),
        TaskCategory::Leetcode => (45, 30, 1, 0.3),
        TaskCategory::Admin => (30, 30, 1, 0.2),
    }
}

fn reference_date(card: &crate::types::UpdateCard) -> chrono::NaiveDate {
    card.received_at_utc.date_naive()
}
