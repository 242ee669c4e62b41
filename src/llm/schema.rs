//! JSON shape gate for raw model output.
//!
//! The core only trusts output that decodes into the expected shape; any
//! entry that violates the schema is dropped silently (the offending update
//! stays stored but produces no task).

use chrono::NaiveDateTime;

use crate::types::TaskCategory;

use super::TaskDraft;

/// Bounds applied to numeric fields regardless of what the model claims.
const MAX_ESTIMATED_MINUTES: i64 = 24 * 60;
const MAX_PRIORITY: i64 = 10;

/// Decode a raw model value into task drafts, dropping invalid entries.
///
/// A non-array value yields an empty result. Within the array, each entry
/// must be an object with a non-empty string `title` and a known `category`;
/// numeric fields are clamped into sane bounds and default when absent.
pub fn decode_task_drafts(value: &serde_json::Value) -> Vec<TaskDraft> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries.iter().filter_map(decode_one).collect()
}

fn decode_one(entry: &serde_json::Value) -> Option<TaskDraft> {
    let object = entry.as_object()?;
    let title = object.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }
    let category = TaskCategory::parse(object.get("category")?.as_str()?).ok()?;

    let due_at_local = match object.get("due_at_local") {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => {
            // A present-but-malformed deadline invalidates the entry; a
            // silently dropped deadline would change scheduling semantics.
            let raw = value.as_str()?;
            Some(NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok()?)
        }
    };

    let estimated_minutes = int_field(object, "estimated_minutes", 60)
        .clamp(1, MAX_ESTIMATED_MINUTES);
    let min_daily_minutes = int_field(object, "min_daily_minutes", 30)
        .clamp(1, MAX_ESTIMATED_MINUTES);
    let priority = int_field(object, "priority", 1).clamp(0, MAX_PRIORITY);
    let stress_weight = object
        .get("stress_weight")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    Some(TaskDraft {
        title: title.to_owned(),
        category,
        due_at_local,
        estimated_minutes,
        min_daily_minutes,
        priority,
        stress_weight,
    })
}

fn int_field(object: &serde_json::Map<String, serde_json::Value>, key: &str, default: i64) -> i64 {
    object
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(default)
}
