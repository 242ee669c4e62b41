//! Tests for the provider-cursor repository.

use daybook::store::Store;
use daybook::types::ProviderCursor;

#[tokio::test]
async fn absent_until_first_upsert() {
    let store = Store::open_in_memory().await.expect("open");
    assert!(store
        .get_cursor("gmail", "personal")
        .await
        .expect("get")
        .is_none());
}

#[tokio::test]
async fn upsert_is_last_writer_wins() {
    let store = Store::open_in_memory().await.expect("open");

    store
        .upsert_cursor("gmail", "personal", &ProviderCursor::new("100", "a"))
        .await
        .expect("upsert");
    store
        .upsert_cursor("gmail", "personal", &ProviderCursor::new("200", "b"))
        .await
        .expect("upsert");

    assert_eq!(
        store.get_cursor("gmail", "personal").await.expect("get"),
        Some(ProviderCursor::new("200", "b"))
    );
}

#[tokio::test]
async fn cursors_are_scoped_per_provider_and_account() {
    let store = Store::open_in_memory().await.expect("open");

    store
        .upsert_cursor("gmail", "personal", &ProviderCursor::new("100", "a"))
        .await
        .expect("upsert");
    store
        .upsert_cursor("outlook", "personal", &ProviderCursor::new("2026-03-01T10:00:00Z", "x"))
        .await
        .expect("upsert");
    store
        .upsert_cursor("gmail", "school", &ProviderCursor::new("300", "c"))
        .await
        .expect("upsert");

    assert_eq!(
        store.get_cursor("gmail", "personal").await.expect("get"),
        Some(ProviderCursor::new("100", "a"))
    );
    assert_eq!(
        store.get_cursor("outlook", "personal").await.expect("get"),
        Some(ProviderCursor::new("2026-03-01T10:00:00Z", "x"))
    );
    assert_eq!(
        store.get_cursor("gmail", "school").await.expect("get"),
        Some(ProviderCursor::new("300", "c"))
    );
}
