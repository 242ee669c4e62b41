//! Tests for plan regeneration: diff stability, retirement cleanup, and
//! revision accounting.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use daybook::apply::PlanApplyService;
use daybook::calendar::{CalendarStore, InMemoryCalendarStore};
use daybook::config::PlannerConfig;
use daybook::store::Store;
use daybook::types::{
    dedupe_key, FeasibilityState, Source, Task, TaskCategory, TaskSource, TaskStatus,
};

const CALENDAR: &str = "Daybook";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .and_then(|d| d.and_hms_opt(8, 30, 0))
        .expect("valid")
}

fn task(title: &str, estimated: i64, due_day: u32) -> Task {
    let due = NaiveDate::from_ymd_opt(2026, 3, due_day).and_then(|d| d.and_hms_opt(23, 59, 0));
    Task {
        task_id: uuid::Uuid::new_v4().to_string(),
        title: title.to_owned(),
        category: TaskCategory::Assignment,
        due_at_local: due,
        estimated_minutes: estimated,
        min_daily_minutes: 30,
        priority: 2,
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

async fn setup() -> (Store, Arc<InMemoryCalendarStore>, PlanApplyService) {
    let store = Store::open_in_memory().await.expect("open");
    let calendar = Arc::new(InMemoryCalendarStore::new());
    calendar
        .ensure_managed_calendar(CALENDAR)
        .await
        .expect("ensure");
    let service = PlanApplyService::new(
        store.clone(),
        Arc::clone(&calendar) as Arc<dyn CalendarStore>,
        PlannerConfig::default(),
        CALENDAR.to_owned(),
    );
    (store, calendar, service)
}

#[tokio::test]
async fn regenerate_places_blocks_for_active_tasks() {
    let (store, calendar, service) = setup().await;
    store
        .upsert_tasks(&[task("CSE312 Homework", 120, 3)])
        .await
        .expect("upsert");

    let outcome = service.regenerate(now(), "gmail_sync").await.expect("regenerate");
    assert_eq!(outcome.revision_id, 1);
    assert!(outcome.created > 0);
    assert_eq!(outcome.deleted, 0);
    assert_eq!(outcome.feasibility, FeasibilityState::OnTrack);

    let blocks = calendar
        .fetch_managed_blocks(now().date(), CALENDAR)
        .await
        .expect("fetch");
    let total: i64 = blocks.iter().map(|b| b.duration_minutes()).sum();
    assert_eq!(outcome.created, i64::try_from(blocks.len()).expect("fits"));
    assert_eq!(total, 120);
}

#[tokio::test]
async fn unchanged_plan_is_a_stable_fixed_point() {
    let (store, _calendar, service) = setup().await;
    store
        .upsert_tasks(&[task("CSE312 Homework", 120, 3)])
        .await
        .expect("upsert");

    let first = service.regenerate(now(), "gmail_sync").await.expect("first");
    let second = service.regenerate(now(), "gmail_sync").await.expect("second");

    // Same tasks, same windows: nothing to create, nothing to delete.
    assert_eq!(second.created, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.revision_id, first.revision_id.saturating_add(1));
}

#[tokio::test]
async fn retired_tasks_get_their_blocks_deleted() {
    let (store, calendar, service) = setup().await;
    let t = task("CSE312 Homework", 120, 3);
    store.upsert_tasks(&[t.clone()]).await.expect("upsert");
    service.regenerate(now(), "gmail_sync").await.expect("first");
    assert!(!calendar.all_blocks().await.is_empty());

    store
        .set_task_status(&t.task_id, TaskStatus::Done)
        .await
        .expect("retire");
    let outcome = service.regenerate(now(), "command_done").await.expect("second");

    assert!(outcome.deleted > 0);
    assert_eq!(outcome.created, 0);
    assert!(calendar.all_blocks().await.is_empty());
}

#[tokio::test]
async fn infeasible_day_clears_managed_blocks() {
    let (store, calendar, _) = setup().await;
    // A one-hour workday cannot absorb the demand.
    let mut constraints = PlannerConfig::default();
    constraints.workday_start_hour = 9;
    constraints.workday_end_hour = 10;
    let service = PlanApplyService::new(
        store.clone(),
        Arc::clone(&calendar) as Arc<dyn CalendarStore>,
        constraints,
        CALENDAR.to_owned(),
    );

    store
        .upsert_tasks(&[task("Everything at once", 600, 2)])
        .await
        .expect("upsert");

    let outcome = service.regenerate(now(), "gmail_sync").await.expect("regenerate");
    assert_eq!(outcome.feasibility, FeasibilityState::Infeasible);
    assert_eq!(outcome.created, 0);
    assert!(!outcome.unscheduled_task_ids.is_empty());
    assert!(calendar.all_blocks().await.is_empty());
}

#[tokio::test]
async fn locked_managed_blocks_survive_regeneration() {
    use daybook::types::{CalendarBlock, LockLevel};

    let (store, calendar, service) = setup().await;
    let locked = CalendarBlock {
        block_id: "locked-1".to_owned(),
        task_id: None,
        title: "Office hours".to_owned(),
        start_local: now().date().and_hms_opt(13, 0, 0).expect("valid"),
        end_local: now().date().and_hms_opt(14, 0, 0).expect("valid"),
        calendar_event_id: Some("evt-locked".to_owned()),
        calendar_name: CALENDAR.to_owned(),
        managed_by_agent: true,
        lock_level: LockLevel::Locked,
        plan_revision: 0,
    };
    calendar.seed_block(locked.clone()).await;
    store
        .upsert_tasks(&[task("CSE312 Homework", 60, 3)])
        .await
        .expect("upsert");

    service.regenerate(now(), "gmail_sync").await.expect("regenerate");

    let blocks = calendar.all_blocks().await;
    assert!(blocks.iter().any(|b| b.block_id == "locked-1"));
    // Planned work does not overlap the locked range.
    for block in blocks.iter().filter(|b| b.block_id != "locked-1") {
        assert!(block.end_local <= locked.start_local || block.start_local >= locked.end_local);
    }
}

#[tokio::test]
async fn every_regeneration_appends_one_revision() {
    let (store, _calendar, service) = setup().await;
    store
        .upsert_tasks(&[task("CSE312 Homework", 60, 3)])
        .await
        .expect("upsert");

    for expected in 1..=4i64 {
        let outcome = service.regenerate(now(), "tick").await.expect("regenerate");
        assert_eq!(outcome.revision_id, expected);
    }
    assert_eq!(store.latest_revision_id().await.expect("latest"), 4);
}
