//! Tests for the command service: revision versioning, rules gating, and
//! calendar mutation through the chat grammar.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use daybook::apply::PlanApplyService;
use daybook::calendar::{CalendarStore, InMemoryCalendarStore};
use daybook::commands::CommandService;
use daybook::config::PlannerConfig;
use daybook::llm::fallback::RuleBasedExtractor;
use daybook::rules::{EditIntent, EditOperation};
use daybook::store::Store;
use daybook::types::{CalendarBlock, LockLevel, RevisionSummary};

const CALENDAR: &str = "Daybook";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .expect("valid")
}

async fn setup() -> (Store, Arc<InMemoryCalendarStore>, CommandService) {
    let store = Store::open_in_memory().await.expect("open");
    let calendar = Arc::new(InMemoryCalendarStore::new());
    calendar
        .ensure_managed_calendar(CALENDAR)
        .await
        .expect("ensure");
    let calendar_store = Arc::clone(&calendar) as Arc<dyn CalendarStore>;
    let apply = Arc::new(PlanApplyService::new(
        store.clone(),
        Arc::clone(&calendar_store),
        PlannerConfig::default(),
        CALENDAR.to_owned(),
    ));
    let service = CommandService::new(
        store.clone(),
        calendar_store,
        Arc::new(RuleBasedExtractor),
        Some(apply),
        CALENDAR.to_owned(),
    );
    (store, calendar, service)
}

fn seeded_block(id: &str, title: &str, hour: u32) -> CalendarBlock {
    CalendarBlock {
        block_id: id.to_owned(),
        task_id: None,
        title: title.to_owned(),
        start_local: now().date().and_hms_opt(hour, 0, 0).expect("valid"),
        end_local: now().date().and_hms_opt(hour.saturating_add(1), 0, 0).expect("valid"),
        calendar_event_id: Some(format!("evt-{id}")),
        calendar_name: CALENDAR.to_owned(),
        managed_by_agent: true,
        lock_level: LockLevel::Flexible,
        plan_revision: 0,
    }
}

#[tokio::test]
async fn add_creates_block_and_bumps_revision() {
    let (store, calendar, service) = setup().await;

    let reply = service
        .handle("add \"Homework 3\" 60m today 7pm", now())
        .await
        .expect("handle");

    assert!(reply.text.contains("Added"));
    assert_eq!(reply.plan_revision, 1);
    assert!(!reply.requires_confirmation);

    let blocks = calendar
        .fetch_managed_blocks(now().date(), CALENDAR)
        .await
        .expect("fetch");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].title, "Homework 3");
    assert_eq!(
        blocks[0].start_local,
        now().date().and_hms_opt(19, 0, 0).expect("valid")
    );
    assert_eq!(blocks[0].duration_minutes(), 60);

    // Durable trail: operation row + revision row + local mirror.
    let op = store
        .latest_undoable_operation()
        .await
        .expect("query")
        .expect("present");
    assert_eq!(op.intent, "create_block");
    assert_eq!(op.applied_revision, Some(1));
    assert_eq!(store.latest_revision_id().await.expect("latest"), 1);
}

#[tokio::test]
async fn add_defaults_to_seven_pm_today() {
    let (_store, calendar, service) = setup().await;
    service.handle("add \"Reading\" 30m", now()).await.expect("handle");
    let blocks = calendar
        .fetch_managed_blocks(now().date(), CALENDAR)
        .await
        .expect("fetch");
    assert_eq!(
        blocks[0].start_local,
        now().date().and_hms_opt(19, 0, 0).expect("valid")
    );
}

#[tokio::test]
async fn move_updates_block_and_bumps_revision() {
    let (_store, calendar, service) = setup().await;
    calendar.seed_block(seeded_block("b1", "Homework", 10)).await;

    let reply = service
        .handle("move \"Homework\" tomorrow 7:00pm", now())
        .await
        .expect("handle");

    assert!(reply.text.contains("Moved"));
    assert_eq!(reply.plan_revision, 1);

    let tomorrow = now().date().succ_opt().expect("valid");
    let blocks = calendar
        .fetch_managed_blocks(tomorrow, CALENDAR)
        .await
        .expect("fetch");
    assert_eq!(blocks.len(), 1);
    assert_eq!(
        blocks[0].start_local,
        tomorrow.and_hms_opt(19, 0, 0).expect("valid")
    );
    // Duration carried over from the existing block.
    assert_eq!(blocks[0].duration_minutes(), 60);
}

#[tokio::test]
async fn ambiguous_move_requires_confirmation_and_keeps_revision() {
    let (store, calendar, service) = setup().await;
    calendar.seed_block(seeded_block("b1", "Homework", 10)).await;
    calendar.seed_block(seeded_block("b2", "Homework", 14)).await;

    let reply = service
        .handle("move \"Homework\" tomorrow 7:00pm", now())
        .await
        .expect("handle");

    assert!(reply.text.starts_with("Ambiguous match"));
    assert!(reply.requires_confirmation);
    assert_eq!(reply.plan_revision, 0);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 0);
}

#[tokio::test]
async fn stale_revision_edit_is_rejected_without_revision_change() {
    let (store, _calendar, service) = setup().await;
    // Advance the ledger to revision 5.
    for _ in 0..5 {
        store
            .append_revision("test", RevisionSummary::default())
            .await
            .expect("append");
    }
    assert_eq!(service.current_revision().await.expect("revision"), 5);

    let mut edit = EditOperation::new(EditIntent::CreateBlock, 4);
    edit.fuzzy_title = Some("Late".to_owned());
    edit.start_local = now().date().and_hms_opt(19, 0, 0);
    edit.end_local = now().date().and_hms_opt(20, 0, 0);

    let reply = service.submit_edit(edit, now()).await.expect("submit");
    assert!(reply.text.contains("stale_plan_revision"));
    assert!(!reply.requires_confirmation);
    assert_eq!(reply.plan_revision, 5);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 5);
}

#[tokio::test]
async fn move_without_match_reports_not_found() {
    let (_store, _calendar, service) = setup().await;
    let reply = service
        .handle("move \"Ghost\" today 7pm", now())
        .await
        .expect("handle");
    assert!(reply.text.contains("No managed block matching"));
    assert_eq!(reply.plan_revision, 0);
}

#[tokio::test]
async fn today_lists_managed_blocks() {
    let (_store, calendar, service) = setup().await;
    calendar.seed_block(seeded_block("b1", "Morning review", 9)).await;
    calendar.seed_block(seeded_block("b2", "Homework", 14)).await;

    let reply = service.handle("today", now()).await.expect("handle");
    assert!(reply.text.contains("Morning review"));
    assert!(reply.text.contains("Homework"));
    assert!(reply.text.contains("09:00"));

    let empty_day = service
        .handle("today", now() + chrono::Duration::days(30))
        .await
        .expect("handle");
    assert!(empty_day.text.contains("No blocks planned"));
}

#[tokio::test]
async fn help_and_parse_errors_leave_revision_unchanged() {
    let (_store, _calendar, service) = setup().await;

    let help = service.handle("help", now()).await.expect("handle");
    assert!(help.text.contains("add \"<title>\""));
    assert_eq!(help.plan_revision, 0);

    let malformed = service.handle("add Homework 60m", now()).await.expect("handle");
    assert!(malformed.text.contains("quoted title"));
    assert_eq!(malformed.plan_revision, 0);
}

#[tokio::test]
async fn free_text_routes_through_the_edit_intent_parser() {
    let (store, _calendar, service) = setup().await;

    // The rule-based intent parser cannot interpret free text safely, so
    // the edit it proposes is held for confirmation by the rules engine.
    let reply = service
        .handle("shuffle my afternoon around", now())
        .await
        .expect("handle");
    assert!(reply.requires_confirmation);
    assert!(reply.text.contains("unparsed_free_text"));
    assert_eq!(reply.plan_revision, 0);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 0);
}

#[tokio::test]
async fn overlap_with_foreign_event_requires_confirmation() {
    let (store, calendar, service) = setup().await;
    let mut lecture = seeded_block("ext", "Lecture", 19);
    lecture.managed_by_agent = false;
    lecture.calendar_name = "School".to_owned();
    calendar.seed_block(lecture).await;

    let reply = service
        .handle("add \"Homework\" 60m today 7pm", now())
        .await
        .expect("handle");

    assert!(reply.requires_confirmation);
    assert!(reply.text.contains("non_agent_event"));
    assert_eq!(reply.plan_revision, 0);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 0);

    // A non-overlapping window sails through.
    let clear = service
        .handle("add \"Homework\" 60m today 9pm", now())
        .await
        .expect("handle");
    assert!(clear.text.contains("Added"));
    assert_eq!(clear.plan_revision, 1);
}

#[tokio::test]
async fn permission_denied_surfaces_in_reply_and_blocks_writes() {
    let (store, calendar, service) = setup().await;
    calendar.deny_writes("calendar access revoked").await;

    let reply = service
        .handle("add \"Homework\" 60m", now())
        .await
        .expect("handle");
    assert!(reply.text.contains("Calendar error"));
    assert_eq!(reply.plan_revision, 0);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 0);

    // Recovery unblocks writes.
    calendar.allow_writes().await;
    let retry = service.handle("add \"Homework\" 60m", now()).await.expect("handle");
    assert!(retry.text.contains("Added"));
    assert_eq!(retry.plan_revision, 1);
}

#[tokio::test]
async fn delete_edit_removes_block_and_bumps_revision() {
    let (store, calendar, service) = setup().await;
    calendar.seed_block(seeded_block("b1", "Old plan", 10)).await;

    let mut edit = EditOperation::new(EditIntent::DeleteBlock, 0);
    edit.fuzzy_title = Some("Old plan".to_owned());
    let reply = service.submit_edit(edit, now()).await.expect("submit");

    assert!(reply.text.contains("Deleted"));
    assert_eq!(reply.plan_revision, 1);
    assert!(calendar.all_blocks().await.is_empty());
    assert_eq!(store.latest_revision_id().await.expect("latest"), 1);

    // Deletes carry no undo envelope.
    let undo = service.handle("undo", now()).await.expect("undo");
    assert!(undo.text.contains("Nothing to undo"));
}

#[tokio::test]
async fn mark_done_edit_retires_the_linked_task() {
    use daybook::types::{
        dedupe_key, FeasibilityState, Task, TaskCategory, TaskStatus,
    };

    let (store, calendar, service) = setup().await;
    let task = Task {
        task_id: "t1".to_owned(),
        title: "CSE312 Homework".to_owned(),
        category: TaskCategory::Assignment,
        due_at_local: None,
        estimated_minutes: 60,
        min_daily_minutes: 30,
        priority: 2,
        stress_weight: 0.5,
        feasibility_state: FeasibilityState::OnTrack,
        status: TaskStatus::Todo,
        dedupe_key: dedupe_key(TaskCategory::Assignment, "CSE312 Homework", None),
        sources: vec![],
    };
    store.upsert_tasks(&[task]).await.expect("upsert");
    let mut block = seeded_block("b1", "CSE312 Homework", 10);
    block.task_id = Some("t1".to_owned());
    calendar.seed_block(block).await;

    let mut edit = EditOperation::new(EditIntent::MarkDone, 0);
    edit.fuzzy_title = Some("CSE312 Homework".to_owned());
    let reply = service.submit_edit(edit, now()).await.expect("submit");

    assert!(reply.text.contains("done"));
    assert_eq!(reply.plan_revision, 1);
    // Retired, not deleted: gone from the active listing, still counted.
    assert!(store.list_active_tasks().await.expect("list").is_empty());
    assert_eq!(store.count_tasks().await.expect("count"), 1);
}

#[tokio::test]
async fn mark_done_without_linked_task_is_a_noop() {
    let (store, calendar, service) = setup().await;
    calendar.seed_block(seeded_block("b1", "Orphan block", 10)).await;

    let mut edit = EditOperation::new(EditIntent::MarkDone, 0);
    edit.fuzzy_title = Some("Orphan block".to_owned());
    let reply = service.submit_edit(edit, now()).await.expect("submit");

    assert!(reply.text.contains("No task linked"));
    assert_eq!(reply.plan_revision, 0);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 0);
}

#[tokio::test]
async fn lock_sleep_edit_pins_a_locked_block() {
    let (_store, calendar, service) = setup().await;

    let mut edit = EditOperation::new(EditIntent::LockSleep, 0);
    edit.sleep_window = Some(("23:00".to_owned(), "07:00".to_owned()));
    let reply = service.submit_edit(edit, now()).await.expect("submit");

    assert!(reply.text.contains("Locked sleep"));
    assert_eq!(reply.plan_revision, 1);

    let blocks = calendar.all_blocks().await;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].lock_level, LockLevel::Locked);
    assert_eq!(
        blocks[0].start_local,
        now().date().and_hms_opt(23, 0, 0).expect("valid")
    );
    // Crosses midnight into the next day.
    assert_eq!(
        blocks[0].end_local,
        now()
            .date()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(7, 0, 0))
            .expect("valid")
    );
}

#[tokio::test]
async fn regenerate_edit_runs_the_apply_service() {
    let (store, _calendar, service) = setup().await;

    let edit = EditOperation::new(EditIntent::RegeneratePlan, 0);
    let reply = service.submit_edit(edit, now()).await.expect("submit");

    assert!(reply.text.contains("Plan regenerated"));
    assert_eq!(reply.plan_revision, 1);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 1);
}

#[tokio::test]
async fn each_applied_mutation_advances_revision_by_one() {
    let (store, calendar, service) = setup().await;
    calendar.seed_block(seeded_block("b1", "Essay", 10)).await;

    let r1 = service.handle("add \"One\" 30m", now()).await.expect("handle");
    assert_eq!(r1.plan_revision, 1);
    let r2 = service.handle("add \"Two\" 30m tomorrow", now()).await.expect("handle");
    assert_eq!(r2.plan_revision, 2);
    let r3 = service
        .handle("move \"Essay\" today 8am", now())
        .await
        .expect("handle");
    assert_eq!(r3.plan_revision, 3);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 3);
}
