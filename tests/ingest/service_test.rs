//! End-to-end tests for one account's sync: fetch → parse → gate → extract
//! → atomic commit, with cursor semantics.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use daybook::apply::PlanApplyService;
use daybook::calendar::{CalendarStore, InMemoryCalendarStore};
use daybook::config::PlannerConfig;
use daybook::ingest::service::IngestionService;
use daybook::llm::fallback::RuleBasedExtractor;
use daybook::parser::ParserPipeline;
use daybook::providers::memory::StaticMailProvider;
use daybook::store::Store;
use daybook::types::{Account, InboundMessage, Source};

fn account() -> Account {
    Account {
        provider: "gmail".to_owned(),
        account_id: "personal".to_owned(),
        email: "me@gmail.com".to_owned(),
        enabled: true,
    }
}

fn message(id: &str, seconds: i64, from: &str, subject: &str, body: &str) -> InboundMessage {
    InboundMessage {
        message_id: id.to_owned(),
        thread_id: None,
        received_at_utc: chrono::DateTime::from_timestamp(seconds, 0).unwrap_or_else(Utc::now),
        from_address: from.to_owned(),
        subject: subject.to_owned(),
        body_text: body.to_owned(),
        links: vec![],
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .expect("valid")
}

fn service_over(provider: Arc<StaticMailProvider>, store: &Store) -> IngestionService {
    IngestionService::new(
        provider,
        store.clone(),
        ParserPipeline::new(vec!["buffalo.edu".to_owned(), "piazza.com".to_owned()]),
        Arc::new(RuleBasedExtractor),
        None,
        account(),
        0.80,
    )
}

#[tokio::test]
async fn sync_persists_updates_tasks_and_cursor_atomically() {
    let store = Store::open_in_memory().await.expect("open");
    let provider = Arc::new(StaticMailProvider::gmail());
    provider.push_page(vec![message(
        "m1",
        1_700_000_000,
        "noreply@buffalo.edu",
        "CSE312 Assignment posted",
        "Homework due on March 2 at 11:59pm",
    )]);

    let service = service_over(Arc::clone(&provider), &store);
    let outcome = service.sync(now()).await.expect("sync");

    assert_eq!(outcome.fetched, 1);
    assert_eq!(outcome.stored_updates, 1);
    assert_eq!(outcome.touched_tasks, 1);

    let cursor = store
        .get_cursor("gmail", "personal")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(cursor.primary, "1700000000");
    assert_eq!(cursor.secondary, "m1");

    let tasks = store.list_active_tasks().await.expect("list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].sources[0].provider_message_id, "m1");
    assert_eq!(tasks[0].sources[0].account_id, "personal");
}

#[tokio::test]
async fn repeated_sync_with_no_new_mail_is_idempotent() {
    let store = Store::open_in_memory().await.expect("open");
    let provider = Arc::new(StaticMailProvider::gmail());
    provider.push_page(vec![message(
        "m1",
        1_700_000_000,
        "noreply@buffalo.edu",
        "CSE312 Assignment posted",
        "Homework due on March 2 at 11:59pm",
    )]);

    let service = service_over(Arc::clone(&provider), &store);
    service.sync(now()).await.expect("first sync");
    let updates_before = store.count_updates(None).await.expect("count");
    let tasks_before = store.count_tasks().await.expect("count");

    // Upstream repeats the same message (inclusive lower bound); the tuple
    // filter drops it.
    provider.push_page(vec![message(
        "m1",
        1_700_000_000,
        "noreply@buffalo.edu",
        "CSE312 Assignment posted",
        "Homework due on March 2 at 11:59pm",
    )]);
    let second = service.sync(now()).await.expect("second sync");

    assert_eq!(second.stored_updates, 0);
    assert_eq!(store.count_updates(None).await.expect("count"), updates_before);
    assert_eq!(store.count_tasks().await.expect("count"), tasks_before);
}

#[tokio::test]
async fn cursor_is_tuple_monotonic_across_syncs() {
    let store = Store::open_in_memory().await.expect("open");
    let provider = Arc::new(StaticMailProvider::gmail());
    let service = service_over(Arc::clone(&provider), &store);

    provider.push_page(vec![
        message("a", 100, "noreply@buffalo.edu", "s", "b"),
        message("b", 200, "noreply@buffalo.edu", "s", "b"),
    ]);
    service.sync(now()).await.expect("sync");
    let first = store
        .get_cursor("gmail", "personal")
        .await
        .expect("get")
        .expect("present");

    provider.push_page(vec![message("c", 300, "noreply@buffalo.edu", "s", "b")]);
    service.sync(now()).await.expect("sync");
    let second = store
        .get_cursor("gmail", "personal")
        .await
        .expect("get")
        .expect("present");

    let first_key: (i64, String) = (first.primary.parse().expect("num"), first.secondary);
    let second_key: (i64, String) = (second.primary.parse().expect("num"), second.secondary);
    assert!(second_key >= first_key);

    // A quiet sync leaves the cursor exactly where it was.
    service.sync(now()).await.expect("sync");
    let third = store
        .get_cursor("gmail", "personal")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(third.primary.parse::<i64>().expect("num"), second_key.0);
}

#[tokio::test]
async fn provider_failure_leaves_cursor_untouched() {
    let store = Store::open_in_memory().await.expect("open");
    let provider = Arc::new(StaticMailProvider::gmail());
    let service = service_over(Arc::clone(&provider), &store);

    provider.push_page(vec![message("a", 100, "noreply@buffalo.edu", "s", "b")]);
    service.sync(now()).await.expect("sync");
    let before = store.get_cursor("gmail", "personal").await.expect("get");

    provider.fail_next("rate limited");
    assert!(service.sync(now()).await.is_err());
    assert_eq!(store.get_cursor("gmail", "personal").await.expect("get"), before);
}

#[tokio::test]
async fn low_confidence_updates_are_stored_but_produce_no_tasks() {
    let store = Store::open_in_memory().await.expect("open");
    let provider = Arc::new(StaticMailProvider::gmail());
    provider.push_page(vec![message(
        "spam1",
        1_700_000_000,
        "spam@unknown.com",
        "Assignment alert",
        "act now",
    )]);

    let service = service_over(Arc::clone(&provider), &store);
    let outcome = service.sync(now()).await.expect("sync");

    assert_eq!(outcome.stored_updates, 1);
    assert_eq!(outcome.touched_tasks, 0);
    let card = store
        .get_update(Source::Gmail, "spam1")
        .await
        .expect("get")
        .expect("present");
    assert!((card.parse_confidence - 0.20).abs() < f64::EPSILON);
    assert!(card.requires_confirmation);
}

#[tokio::test]
async fn successful_sync_triggers_plan_regeneration() {
    let store = Store::open_in_memory().await.expect("open");
    let calendar = Arc::new(InMemoryCalendarStore::new());
    calendar
        .ensure_managed_calendar("Daybook")
        .await
        .expect("ensure");
    let apply = Arc::new(PlanApplyService::new(
        store.clone(),
        Arc::clone(&calendar) as Arc<dyn CalendarStore>,
        PlannerConfig::default(),
        "Daybook".to_owned(),
    ));

    let provider = Arc::new(StaticMailProvider::gmail());
    provider.push_page(vec![message(
        "m1",
        1_700_000_000,
        "noreply@buffalo.edu",
        "CSE312 Assignment posted",
        "Homework due on March 2 at 11:59pm",
    )]);
    let service = IngestionService::new(
        provider,
        store.clone(),
        ParserPipeline::new(vec!["buffalo.edu".to_owned()]),
        Arc::new(RuleBasedExtractor),
        Some(apply),
        account(),
        0.80,
    );

    service.sync(now()).await.expect("sync");

    // The regeneration placed blocks for the extracted task.
    let blocks = calendar
        .fetch_managed_blocks(now().date(), "Daybook")
        .await
        .expect("fetch");
    assert!(!blocks.is_empty());
    assert!(store.latest_revision_id().await.expect("latest") >= 1);
}
