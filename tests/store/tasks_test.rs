//! Tests for the task repository: dedupe-key upsert, provenance
//! replacement, and the active listing.

use chrono::NaiveDate;

use daybook::store::Store;
use daybook::types::{
    dedupe_key, FeasibilityState, Source, Task, TaskCategory, TaskSource, TaskStatus,
};

fn task(title: &str, priority: i64, due_day: Option<u32>) -> Task {
    let due = due_day.and_then(|day| {
        NaiveDate::from_ymd_opt(2026, 3, day).and_then(|d| d.and_hms_opt(23, 59, 0))
    });
    Task {
        task_id: uuid::Uuid::new_v4().to_string(),
        title: title.to_owned(),
        category: TaskCategory::Assignment,
        due_at_local: due,
        estimated_minutes: 120,
        min_daily_minutes: 30,
        priority,
        stress_weight: 0.5,
        feasibility_state: FeasibilityState::OnTrack,
        status: TaskStatus::Todo,
        dedupe_key: dedupe_key(TaskCategory::Assignment, title, due),
        sources: vec![TaskSource {
            source: Source::Gmail,
            account_id: "personal".to_owned(),
            provider_message_id: format!("m-{title}"),
            confidence: 0.9,
        }],
    }
}

#[tokio::test]
async fn same_dedupe_key_merges_into_one_row() {
    let store = Store::open_in_memory().await.expect("open");

    let first = task("CSE312 Homework 3", 2, Some(2));
    store.upsert_tasks(&[first.clone()]).await.expect("upsert");

    // Same (category, lowercase title, due): merges, keeps original id,
    // refreshes mutable fields.
    let mut second = task("cse312 homework 3", 5, Some(2));
    second.estimated_minutes = 90;
    store.upsert_tasks(&[second]).await.expect("upsert");

    assert_eq!(store.count_tasks().await.expect("count"), 1);
    let stored = store
        .get_task_by_dedupe_key(&first.dedupe_key)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.task_id, first.task_id);
    assert_eq!(stored.priority, 5);
    assert_eq!(stored.estimated_minutes, 90);
}

#[tokio::test]
async fn provenance_rows_are_replaced_on_upsert() {
    let store = Store::open_in_memory().await.expect("open");
    let original = task("Quiz 4", 1, None);
    store.upsert_tasks(&[original.clone()]).await.expect("upsert");

    let mut refreshed = task("Quiz 4", 1, None);
    refreshed.sources = vec![
        TaskSource {
            source: Source::Gmail,
            account_id: "personal".to_owned(),
            provider_message_id: "m-new".to_owned(),
            confidence: 0.95,
        },
        TaskSource {
            source: Source::Outlook,
            account_id: "school".to_owned(),
            provider_message_id: "m-other".to_owned(),
            confidence: 0.80,
        },
    ];
    store.upsert_tasks(&[refreshed]).await.expect("upsert");

    let stored = store
        .get_task_by_dedupe_key(&original.dedupe_key)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.sources.len(), 2);
    assert!(stored
        .sources
        .iter()
        .all(|s| s.provider_message_id != format!("m-{}", "Quiz 4")));
}

#[tokio::test]
async fn active_listing_orders_and_filters() {
    let store = Store::open_in_memory().await.expect("open");
    let low = task("Low priority", 1, Some(5));
    let high_late = task("High due late", 5, Some(20));
    let high_soon = task("High due soon", 5, Some(3));
    let undated = task("High undated", 5, None);
    let done = {
        let mut t = task("Already done", 9, Some(2));
        t.status = TaskStatus::Done;
        t
    };
    store
        .upsert_tasks(&[low, high_late, high_soon, undated, done])
        .await
        .expect("upsert");

    let active = store.list_active_tasks().await.expect("list");
    let titles: Vec<&str> = active.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["High due soon", "High due late", "High undated", "Low priority"]
    );
}

#[tokio::test]
async fn status_transitions_and_retirement() {
    let store = Store::open_in_memory().await.expect("open");
    let t = task("Retire me", 1, None);
    store.upsert_tasks(&[t.clone()]).await.expect("upsert");

    store
        .set_task_status(&t.task_id, TaskStatus::InProgress)
        .await
        .expect("to in_progress");
    assert_eq!(store.list_active_tasks().await.expect("list").len(), 1);

    store
        .set_task_status(&t.task_id, TaskStatus::Done)
        .await
        .expect("to done");
    // Retired, not deleted.
    assert!(store.list_active_tasks().await.expect("list").is_empty());
    assert_eq!(store.count_tasks().await.expect("count"), 1);

    assert!(store
        .set_task_status("no-such-task", TaskStatus::Done)
        .await
        .is_err());
}
