//! Unit tests for folding item outcomes into inquiry counters.

use std::sync::Arc;

use catalog_intake::models::inquiry::{Inquiry, InquiryItem, InquiryStatus, ItemOutcome};
use catalog_intake::persistence::{db, inquiry_repo::InquiryRepo, InquiryStore};
use catalog_intake::pipeline::aggregator::fold_outcome;

async fn store_with(n: usize) -> (InquiryRepo, Inquiry) {
    let db = db::connect_memory().await.expect("db");
    let repo = InquiryRepo::new(Arc::new(db));
    let inquiry = Inquiry::new(
        (1..=n)
            .map(|i| InquiryItem::new(format!("T-{i}"), "x", None))
            .collect(),
    );
    InquiryStore::create(&repo, &inquiry).await.expect("create");
    (repo, inquiry)
}

#[tokio::test]
async fn intermediate_fold_does_not_settle() {
    let (repo, inq) = store_with(2).await;

    let report = fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");

    assert!(report.counted());
    assert_eq!(report.settled, None);
    assert_eq!(report.counters.map(|c| c.processed), Some(1));
}

#[tokio::test]
async fn final_fold_settles_processed() {
    let (repo, inq) = store_with(2).await;
    fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");

    let report = fold_outcome(&repo, &inq.id, "T-2", ItemOutcome::Processed)
        .await
        .expect("fold");

    assert_eq!(report.settled, Some(InquiryStatus::Processed));
    let loaded = repo.get_by_id(&inq.id).await.expect("load").expect("present");
    assert_eq!(loaded.status, InquiryStatus::Processed);
}

#[tokio::test]
async fn any_failure_settles_failed() {
    let (repo, inq) = store_with(2).await;
    fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Failed)
        .await
        .expect("fold");

    let report = fold_outcome(&repo, &inq.id, "T-2", ItemOutcome::Processed)
        .await
        .expect("fold");

    assert_eq!(report.settled, Some(InquiryStatus::Failed));
}

#[tokio::test]
async fn duplicate_fold_reports_nothing() {
    let (repo, inq) = store_with(1).await;
    fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");

    let report = fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");

    assert!(!report.counted());
    assert_eq!(report.settled, None);
}

#[tokio::test]
async fn repeated_fold_settles_counted_but_active_inquiry() {
    let (repo, inq) = store_with(1).await;
    // Counter committed, status write never happened.
    repo.increment_processed(&inq.id, "T-1")
        .await
        .expect("increment")
        .expect("counted");
    assert_eq!(
        repo.get_by_id(&inq.id).await.expect("load").expect("present").status,
        InquiryStatus::Active
    );

    let report = fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Failed)
        .await
        .expect("fold");

    assert!(!report.counted());
    assert_eq!(report.settled, Some(InquiryStatus::Processed));
    let loaded = repo.get_by_id(&inq.id).await.expect("load").expect("present");
    assert_eq!(
        (loaded.items_processed_count, loaded.items_failed_count, loaded.status),
        (1, 0, InquiryStatus::Processed)
    );
    assert_eq!(
        repo.recorded_outcome(&inq.id, "T-1").await.expect("outcome"),
        Some(ItemOutcome::Processed)
    );
}

#[tokio::test]
async fn repeated_fold_leaves_unsettled_inquiry_active() {
    let (repo, inq) = store_with(2).await;
    fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");

    let report = fold_outcome(&repo, &inq.id, "T-1", ItemOutcome::Processed)
        .await
        .expect("fold");

    assert_eq!(report.settled, None);
    let loaded = repo.get_by_id(&inq.id).await.expect("load").expect("present");
    assert_eq!(loaded.status, InquiryStatus::Active);
}
