//! Tests for the operation log: durable undo candidates and the one-shot
//! `applied → undone` transition.

use chrono::Utc;

use daybook::store::Store;
use daybook::types::{Operation, OperationStatus};

fn op(intent: &str, status: OperationStatus, applied: Option<i64>) -> Operation {
    Operation {
        op_id: uuid::Uuid::new_v4().to_string(),
        expected_plan_revision: applied.map(|r| r.saturating_sub(1)).unwrap_or(0),
        applied_revision: applied,
        intent: intent.to_owned(),
        status,
        payload_json: serde_json::json!({ "intent": intent }),
        result_json: serde_json::json!({ "kind": "created_block", "block_id": "b1" }),
        created_at_utc: Utc::now(),
    }
}

#[tokio::test]
async fn roundtrip() {
    let store = Store::open_in_memory().await.expect("open");
    let record = op("create_block", OperationStatus::Applied, Some(3));
    store.insert_operation(&record).await.expect("insert");

    let loaded = store
        .get_operation(&record.op_id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(loaded, record);
}

#[tokio::test]
async fn latest_undoable_skips_non_candidates() {
    let store = Store::open_in_memory().await.expect("open");

    store
        .insert_operation(&op("create_block", OperationStatus::Applied, Some(1)))
        .await
        .expect("insert");
    let newest_applied = op("move_block", OperationStatus::Applied, Some(2));
    store.insert_operation(&newest_applied).await.expect("insert");
    // None of these are undo candidates.
    store
        .insert_operation(&op("regenerate_plan", OperationStatus::Applied, Some(3)))
        .await
        .expect("insert");
    store
        .insert_operation(&op("create_block", OperationStatus::Rejected, None))
        .await
        .expect("insert");
    store
        .insert_operation(&op("move_block", OperationStatus::Undone, Some(4)))
        .await
        .expect("insert");

    let candidate = store
        .latest_undoable_operation()
        .await
        .expect("query")
        .expect("present");
    assert_eq!(candidate.op_id, newest_applied.op_id);
}

#[tokio::test]
async fn mark_undone_is_one_shot() {
    let store = Store::open_in_memory().await.expect("open");
    let record = op("create_block", OperationStatus::Applied, Some(1));
    store.insert_operation(&record).await.expect("insert");

    store.mark_operation_undone(&record.op_id).await.expect("first undo");
    let loaded = store
        .get_operation(&record.op_id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(loaded.status, OperationStatus::Undone);

    // A second transition is an invariant violation.
    assert!(store.mark_operation_undone(&record.op_id).await.is_err());
}

#[tokio::test]
async fn latest_applied_revision_tracks_max() {
    let store = Store::open_in_memory().await.expect("open");
    assert_eq!(store.latest_applied_revision().await.expect("latest"), 0);

    store
        .insert_operation(&op("create_block", OperationStatus::Applied, Some(7)))
        .await
        .expect("insert");
    store
        .insert_operation(&op("move_block", OperationStatus::Applied, Some(4)))
        .await
        .expect("insert");
    store
        .insert_operation(&op("create_block", OperationStatus::Rejected, None))
        .await
        .expect("insert");

    assert_eq!(store.latest_applied_revision().await.expect("latest"), 7);
}
