//! Tests for the plan-revision ledger: strict monotonic allocation.

use daybook::store::Store;
use daybook::types::RevisionSummary;

#[tokio::test]
async fn starts_at_zero_and_increments_by_one() {
    let store = Store::open_in_memory().await.expect("open");
    assert_eq!(store.latest_revision_id().await.expect("latest"), 0);

    let summary = RevisionSummary {
        created: 2,
        moved: 0,
        deleted: 1,
    };
    assert_eq!(store.append_revision("gmail_sync", summary).await.expect("append"), 1);
    assert_eq!(store.append_revision("command_add", summary).await.expect("append"), 2);
    assert_eq!(store.append_revision("undo", summary).await.expect("append"), 3);
    assert_eq!(store.latest_revision_id().await.expect("latest"), 3);
}

#[tokio::test]
async fn rows_carry_trigger_and_summary() {
    let store = Store::open_in_memory().await.expect("open");
    store
        .append_revision(
            "outlook_sync",
            RevisionSummary {
                created: 4,
                moved: 1,
                deleted: 2,
            },
        )
        .await
        .expect("append");

    let rows = store.recent_revisions(10).await.expect("recent");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].revision_id, 1);
    assert_eq!(rows[0].trigger, "outlook_sync");
    assert_eq!(rows[0].summary.created, 4);
    assert_eq!(rows[0].summary.moved, 1);
    assert_eq!(rows[0].summary.deleted, 2);
}

#[tokio::test]
async fn recent_lists_newest_first() {
    let store = Store::open_in_memory().await.expect("open");
    for trigger in ["a", "b", "c"] {
        store
            .append_revision(trigger, RevisionSummary::default())
            .await
            .expect("append");
    }
    let rows = store.recent_revisions(2).await.expect("recent");
    let triggers: Vec<&str> = rows.iter().map(|r| r.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["c", "b"]);
}
