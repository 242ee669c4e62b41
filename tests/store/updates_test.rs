//! Tests for the update-card repository: idempotent insert-or-ignore keyed
//! by `(source, provider_message_id)`.

use chrono::Utc;

use daybook::parser::content_hash;
use daybook::store::Store;
use daybook::types::{ParserMethod, ProviderCursor, Source, UpdateCard};

fn card(message_id: &str, subject: &str) -> UpdateCard {
    UpdateCard {
        update_id: uuid::Uuid::new_v4().to_string(),
        account_id: "personal".to_owned(),
        source: Source::Gmail,
        provider_message_id: message_id.to_owned(),
        provider_thread_id: None,
        received_at_utc: Utc::now(),
        sender: "noreply@buffalo.edu".to_owned(),
        subject: subject.to_owned(),
        body_text: format!("body of {message_id}"),
        links: vec!["https://example.edu/a1".to_owned()],
        tags: vec!["course:CSE312".to_owned()],
        parser_method: ParserMethod::RuleBased,
        parse_confidence: 0.85,
        evidence: vec!["template:ublearns_assignment".to_owned()],
        requires_confirmation: false,
        content_hash: content_hash(&format!("body of {message_id}")),
    }
}

#[tokio::test]
async fn insert_then_duplicate_is_ignored() {
    let store = Store::open_in_memory().await.expect("open");

    let first = store.upsert_updates(&[card("m1", "Assignment")]).await.expect("upsert");
    assert_eq!(first, 1);

    // Same natural key, different update_id and subject: ignored.
    let second = store
        .upsert_updates(&[card("m1", "Assignment (edited)")])
        .await
        .expect("upsert");
    assert_eq!(second, 0);

    let stored = store
        .get_update(Source::Gmail, "m1")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.subject, "Assignment");
    assert_eq!(store.count_updates(None).await.expect("count"), 1);
}

#[tokio::test]
async fn cards_roundtrip_all_fields() {
    let store = Store::open_in_memory().await.expect("open");
    let original = card("m2", "Quiz posted");
    store.upsert_updates(&[original.clone()]).await.expect("upsert");

    let stored = store
        .get_update(Source::Gmail, "m2")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.update_id, original.update_id);
    assert_eq!(stored.links, original.links);
    assert_eq!(stored.tags, original.tags);
    assert_eq!(stored.evidence, original.evidence);
    assert_eq!(stored.content_hash, original.content_hash);
    assert_eq!(stored.parser_method, ParserMethod::RuleBased);
    assert!((stored.parse_confidence - 0.85).abs() < f64::EPSILON);
}

#[tokio::test]
async fn same_message_id_different_source_is_distinct() {
    let store = Store::open_in_memory().await.expect("open");
    let mut outlook = card("m3", "From outlook");
    outlook.source = Source::Outlook;

    store.upsert_updates(&[card("m3", "From gmail")]).await.expect("upsert");
    store.upsert_updates(&[outlook]).await.expect("upsert");
    assert_eq!(store.count_updates(None).await.expect("count"), 2);
}

#[tokio::test]
async fn commit_sync_batch_is_atomic_and_idempotent() {
    let store = Store::open_in_memory().await.expect("open");
    let cursor = ProviderCursor::new("1700000000", "m4");

    let commit = store
        .commit_sync_batch(&[card("m4", "First")], &[], "gmail", "personal", &cursor)
        .await
        .expect("commit");
    assert_eq!(commit.stored_updates, 1);
    assert_eq!(
        store.get_cursor("gmail", "personal").await.expect("cursor"),
        Some(cursor.clone())
    );

    // Re-committing the same batch stores nothing new.
    let again = store
        .commit_sync_batch(&[card("m4", "First")], &[], "gmail", "personal", &cursor)
        .await
        .expect("commit");
    assert_eq!(again.stored_updates, 0);
    assert_eq!(store.count_updates(None).await.expect("count"), 1);
}

#[tokio::test]
async fn recent_updates_scoped_to_account() {
    let store = Store::open_in_memory().await.expect("open");
    let mut other = card("m5", "Other account");
    other.account_id = "school".to_owned();

    store.upsert_updates(&[card("m6", "Mine"), other]).await.expect("upsert");
    let mine = store.recent_updates("personal", 10).await.expect("recent");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].subject, "Mine");
    assert_eq!(store.count_updates(Some("school")).await.expect("count"), 1);
}
