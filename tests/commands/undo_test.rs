//! Tests for durable undo: inverse semantics and restart recovery.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use daybook::calendar::{CalendarStore, InMemoryCalendarStore};
use daybook::commands::CommandService;
use daybook::llm::fallback::RuleBasedExtractor;
use daybook::store::Store;
use daybook::types::{CalendarBlock, LockLevel, OperationStatus};

const CALENDAR: &str = "Daybook";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .expect("valid")
}

fn service_over(store: &Store, calendar: &Arc<InMemoryCalendarStore>) -> CommandService {
    CommandService::new(
        store.clone(),
        Arc::clone(calendar) as Arc<dyn CalendarStore>,
        Arc::new(RuleBasedExtractor),
        None,
        CALENDAR.to_owned(),
    )
}

async fn setup() -> (Store, Arc<InMemoryCalendarStore>, CommandService) {
    let store = Store::open_in_memory().await.expect("open");
    let calendar = Arc::new(InMemoryCalendarStore::new());
    calendar
        .ensure_managed_calendar(CALENDAR)
        .await
        .expect("ensure");
    let service = service_over(&store, &calendar);
    (store, calendar, service)
}

#[tokio::test]
async fn undo_after_add_restores_empty_block_set() {
    let (store, calendar, service) = setup().await;

    service
        .handle("add \"Homework\" 60m today 7pm", now())
        .await
        .expect("add");
    assert_eq!(calendar.all_blocks().await.len(), 1);

    let reply = service.handle("undo", now()).await.expect("undo");
    assert!(reply.text.contains("Undid"));
    assert_eq!(reply.plan_revision, 2);
    assert!(calendar.all_blocks().await.is_empty());

    // The operation row flipped to undone exactly once.
    assert!(store
        .latest_undoable_operation()
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn undo_after_move_restores_prior_block_byte_for_byte() {
    let (_store, calendar, service) = setup().await;
    let original = CalendarBlock {
        block_id: "b1".to_owned(),
        task_id: Some("t1".to_owned()),
        title: "Essay draft".to_owned(),
        start_local: now().date().and_hms_opt(10, 0, 0).expect("valid"),
        end_local: now().date().and_hms_opt(11, 30, 0).expect("valid"),
        calendar_event_id: Some("evt-b1".to_owned()),
        calendar_name: CALENDAR.to_owned(),
        managed_by_agent: true,
        lock_level: LockLevel::Flexible,
        plan_revision: 0,
    };
    calendar.seed_block(original.clone()).await;

    service
        .handle("move \"Essay draft\" tomorrow 7:00pm", now())
        .await
        .expect("move");
    let moved = calendar.all_blocks().await;
    assert_ne!(moved[0].start_local, original.start_local);

    service.handle("undo", now()).await.expect("undo");
    let restored = calendar.all_blocks().await;
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0], original);
}

#[tokio::test]
async fn undo_with_empty_history_is_a_noop() {
    let (store, _calendar, service) = setup().await;
    let reply = service.handle("undo", now()).await.expect("undo");
    assert!(reply.text.contains("Nothing to undo"));
    assert_eq!(reply.plan_revision, 0);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 0);
}

#[tokio::test]
async fn undo_survives_restart_via_operation_log() {
    let (store, calendar, first_instance) = setup().await;

    first_instance
        .handle("add \"Homework\" 60m today 7pm", now())
        .await
        .expect("add");
    let op_before = store
        .latest_undoable_operation()
        .await
        .expect("query")
        .expect("present");
    drop(first_instance);

    // A fresh service over the same store has an empty in-memory stack and
    // must fall back to the durable operation log.
    let second_instance = service_over(&store, &calendar);
    let reply = second_instance.handle("undo", now()).await.expect("undo");

    assert!(reply.text.contains("Undid"));
    assert_eq!(reply.plan_revision, 2);
    assert!(calendar.all_blocks().await.is_empty());
    let op_after = store
        .get_operation(&op_before.op_id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(op_after.status, OperationStatus::Undone);
}

#[tokio::test]
async fn double_undo_does_not_replay_the_same_operation() {
    let (_store, calendar, service) = setup().await;

    service
        .handle("add \"Homework\" 60m today 7pm", now())
        .await
        .expect("add");
    service.handle("undo", now()).await.expect("first undo");

    let reply = service.handle("undo", now()).await.expect("second undo");
    assert!(reply.text.contains("Nothing to undo"));
    assert!(calendar.all_blocks().await.is_empty());
}
