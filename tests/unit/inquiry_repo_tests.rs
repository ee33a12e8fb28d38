//! Unit tests for `InquiryRepo` against in-memory `SQLite`.
//!
//! Validates:
//! - Create and load round-trip the items and counters
//! - `record_outcome` increments once per ref and never past the total
//! - `set_terminal_status` transitions only active, settled inquiries
//! - `list_folded_refs` and `list_active_ids` reflect stored state

use std::sync::Arc;

use catalog_intake::models::inquiry::{Inquiry, InquiryItem, InquiryStatus, ItemOutcome};
use catalog_intake::persistence::{db, inquiry_repo::InquiryRepo};
use catalog_intake::AppError;

fn sample_inquiry(n: usize) -> Inquiry {
    Inquiry::new(
        (1..=n)
            .map(|i| InquiryItem::new(format!("T-{i}"), format!("item {i}"), Some("d".into())))
            .collect(),
    )
}

async fn repo() -> InquiryRepo {
    let db = db::connect_memory().await.expect("db");
    InquiryRepo::new(Arc::new(db))
}

#[tokio::test]
async fn create_and_load_round_trip() {
    let repo = repo().await;
    let inquiry = sample_inquiry(3);
    repo.create(&inquiry).await.expect("create");

    let loaded = repo
        .get_by_id(&inquiry.id)
        .await
        .expect("load")
        .expect("present");

    assert_eq!(loaded.id, inquiry.id);
    assert_eq!(loaded.items, inquiry.items);
    assert_eq!(loaded.items_total_count, 3);
    assert_eq!(loaded.status, InquiryStatus::Active);
    assert_eq!(loaded.counters(), inquiry.counters());
}

#[tokio::test]
async fn load_missing_returns_none() {
    let repo = repo().await;
    assert!(repo.get_by_id("nope").await.expect("load").is_none());
}

#[tokio::test]
async fn duplicate_create_fails() {
    let repo = repo().await;
    let inquiry = sample_inquiry(1);
    repo.create(&inquiry).await.expect("create");
    assert!(matches!(repo.create(&inquiry).await, Err(AppError::Db(_))));
}

#[tokio::test]
async fn record_outcome_returns_running_counters() {
    let repo = repo().await;
    let inquiry = sample_inquiry(3);
    repo.create(&inquiry).await.expect("create");

    let first = repo
        .record_outcome(&inquiry.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold")
        .expect("counted");
    assert_eq!((first.processed, first.failed), (1, 0));

    let second = repo
        .record_outcome(&inquiry.id, "T-2", ItemOutcome::Failed)
        .await
        .expect("fold")
        .expect("counted");
    assert_eq!((second.processed, second.failed), (1, 1));
    assert!(!second.is_settled());
}

#[tokio::test]
async fn repeated_outcome_for_same_ref_is_ignored() {
    let repo = repo().await;
    let inquiry = sample_inquiry(2);
    repo.create(&inquiry).await.expect("create");

    repo.record_outcome(&inquiry.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold")
        .expect("counted");
    let again = repo
        .record_outcome(&inquiry.id, "T-1", ItemOutcome::Failed)
        .await
        .expect("fold");
    assert!(again.is_none());

    let loaded = repo.get_by_id(&inquiry.id).await.expect("load").expect("present");
    assert_eq!(loaded.items_processed_count, 1);
    assert_eq!(loaded.items_failed_count, 0);
}

#[tokio::test]
async fn outcome_for_missing_inquiry_is_ignored() {
    let repo = repo().await;
    let result = repo
        .record_outcome("ghost", "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");
    assert!(result.is_none());
    assert!(repo.list_folded_refs("ghost").await.expect("refs").is_empty());
}

#[tokio::test]
async fn counters_never_exceed_total() {
    let repo = repo().await;
    let inquiry = sample_inquiry(1);
    repo.create(&inquiry).await.expect("create");

    repo.record_outcome(&inquiry.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold")
        .expect("counted");
    let overflow = repo
        .record_outcome(&inquiry.id, "T-99", ItemOutcome::Processed)
        .await
        .expect("fold");
    assert!(overflow.is_none());

    let loaded = repo.get_by_id(&inquiry.id).await.expect("load").expect("present");
    assert_eq!(loaded.items_processed_count, 1);
}

#[tokio::test]
async fn terminal_status_requires_settled_active_inquiry() {
    let repo = repo().await;
    let inquiry = sample_inquiry(1);
    repo.create(&inquiry).await.expect("create");

    assert!(!repo
        .set_terminal_status(&inquiry.id, InquiryStatus::Processed)
        .await
        .expect("cas"));

    repo.record_outcome(&inquiry.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");

    assert!(repo
        .set_terminal_status(&inquiry.id, InquiryStatus::Processed)
        .await
        .expect("cas"));
    assert!(!repo
        .set_terminal_status(&inquiry.id, InquiryStatus::Failed)
        .await
        .expect("cas"));

    let loaded = repo.get_by_id(&inquiry.id).await.expect("load").expect("present");
    assert_eq!(loaded.status, InquiryStatus::Processed);
}

#[tokio::test]
async fn active_is_not_a_terminal_status() {
    let repo = repo().await;
    let inquiry = sample_inquiry(0);
    repo.create(&inquiry).await.expect("create");

    let result = repo
        .set_terminal_status(&inquiry.id, InquiryStatus::Active)
        .await;
    assert!(matches!(result, Err(AppError::Db(_))));
}

#[tokio::test]
async fn folded_refs_and_active_ids() {
    let repo = repo().await;
    let open = sample_inquiry(2);
    let done = sample_inquiry(0);
    repo.create(&open).await.expect("create");
    repo.create(&done).await.expect("create");
    assert!(repo
        .set_terminal_status(&done.id, InquiryStatus::Processed)
        .await
        .expect("cas"));

    repo.record_outcome(&open.id, "T-2", ItemOutcome::Failed)
        .await
        .expect("fold");

    assert_eq!(
        repo.list_folded_refs(&open.id).await.expect("refs"),
        vec!["T-2".to_owned()]
    );
    assert_eq!(repo.list_active_ids().await.expect("ids"), vec![open.id]);
}
