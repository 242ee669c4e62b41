//! Tests for multi-account fan-out: failure isolation and the
//! all-accounts-failed aggregate.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use daybook::ingest::coordinator::MultiAccountCoordinator;
use daybook::ingest::service::IngestionService;
use daybook::llm::fallback::RuleBasedExtractor;
use daybook::parser::ParserPipeline;
use daybook::providers::memory::StaticMailProvider;
use daybook::store::Store;
use daybook::types::{Account, InboundMessage};

fn account(provider: &str, id: &str) -> Account {
    Account {
        provider: provider.to_owned(),
        account_id: id.to_owned(),
        email: format!("{id}@example.edu"),
        enabled: true,
    }
}

fn message(id: &str, seconds: i64) -> InboundMessage {
    InboundMessage {
        message_id: id.to_owned(),
        thread_id: None,
        received_at_utc: chrono::DateTime::from_timestamp(seconds, 0).unwrap_or_else(Utc::now),
        from_address: "noreply@buffalo.edu".to_owned(),
        subject: "CSE312 Assignment posted".to_owned(),
        body_text: "Homework due on March 2 at 11:59pm".to_owned(),
        links: vec![],
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .expect("valid")
}

fn service(
    store: &Store,
    provider: Arc<StaticMailProvider>,
    account: Account,
) -> Arc<IngestionService> {
    Arc::new(IngestionService::new(
        provider,
        store.clone(),
        ParserPipeline::new(vec!["buffalo.edu".to_owned()]),
        Arc::new(RuleBasedExtractor),
        None,
        account,
        0.80,
    ))
}

#[tokio::test]
async fn one_failing_account_does_not_abort_siblings() {
    let store = Store::open_in_memory().await.expect("open");

    let healthy = Arc::new(StaticMailProvider::gmail());
    healthy.push_page(vec![message("m1", 100)]);
    let broken = Arc::new(StaticMailProvider::outlook());
    broken.fail_next("token revoked upstream");

    let coordinator = MultiAccountCoordinator::new(vec![
        service(&store, healthy, account("gmail", "personal")),
        service(&store, broken, account("outlook", "school")),
    ]);

    let summary = coordinator.sync_all(now()).await.expect("partial success");
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].account_id, "school");
    assert!(summary.failures[0].reason.contains("token revoked"));

    // The sibling's updates are fully persisted.
    assert_eq!(store.count_updates(Some("personal")).await.expect("count"), 1);
    assert_eq!(summary.total_fetched(), 1);
}

#[tokio::test]
async fn all_accounts_failing_surfaces_one_aggregate_error() {
    let store = Store::open_in_memory().await.expect("open");

    let first = Arc::new(StaticMailProvider::gmail());
    first.fail_next("dns exploded");
    let second = Arc::new(StaticMailProvider::outlook());
    second.fail_next("rate limited");

    let coordinator = MultiAccountCoordinator::new(vec![
        service(&store, first, account("gmail", "personal")),
        service(&store, second, account("outlook", "school")),
    ]);

    let err = coordinator.sync_all(now()).await.expect_err("all failed");
    let text = err.to_string();
    assert!(text.contains("all_account_syncs_failed"));
    assert!(text.contains("dns exploded"));
    assert!(text.contains("rate limited"));
}

#[tokio::test]
async fn no_accounts_is_an_empty_success() {
    let coordinator = MultiAccountCoordinator::new(vec![]);
    let summary = coordinator.sync_all(now()).await.expect("empty");
    assert!(summary.results.is_empty());
    assert!(summary.failures.is_empty());
    assert_eq!(summary.total_fetched(), 0);
}
