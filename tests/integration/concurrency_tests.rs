//! Concurrent completion of units belonging to the same inquiry.
//!
//! Runs on a multi-thread runtime against both a file-backed `SQLite`
//! database (several pooled connections) and the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use catalog_intake::models::inquiry::{Inquiry, InquiryItem, InquiryStatus};
use catalog_intake::persistence::{db, Stores};
use catalog_intake::pipeline::processor::ItemProcessor;
use catalog_intake::pipeline::retry::{AttemptOutcome, RetryPolicy};
use catalog_intake::pipeline::ProcessingUnit;

use super::test_helpers::{sqlite_config, Harness};

async fn sqlite_stores(dir: &std::path::Path) -> Stores {
    let db = db::connect(dir.join("race.db")).await.expect("db");
    Stores::sqlite(Arc::new(db))
}

fn inquiry(n: usize) -> Inquiry {
    Inquiry::new(
        (1..=n)
            .map(|i| InquiryItem::new(format!("T-{i}"), format!("item {i}"), None))
            .collect(),
    )
}

fn units(inquiry: &Inquiry) -> Vec<ProcessingUnit> {
    inquiry
        .items
        .iter()
        .map(|item| {
            ProcessingUnit::new(
                inquiry.id.clone(),
                item.clone(),
                false,
                RetryPolicy::new(2, Duration::ZERO),
            )
        })
        .collect()
}

async fn last_two_complete_together(stores: Stores) {
    let inq = inquiry(3);
    stores.inquiries.create(&inq).await.expect("create");
    let processor = ItemProcessor::new(
        Arc::clone(&stores.inquiries),
        Arc::clone(&stores.catalog),
    );
    let units = units(&inq);

    processor.process(&units[0]).await;
    let (a, b) = tokio::join!(processor.process(&units[1]), processor.process(&units[2]));

    assert!(matches!(a, AttemptOutcome::Success { .. }));
    assert!(matches!(b, AttemptOutcome::Success { .. }));

    let settled = stores
        .inquiries
        .load(&inq.id)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(settled.items_processed_count, 3);
    assert_eq!(settled.items_failed_count, 0);
    assert_eq!(settled.status, InquiryStatus::Processed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_two_units_race_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    last_two_complete_together(sqlite_stores(dir.path()).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_two_units_race_in_memory() {
    last_two_complete_together(Stores::memory()).await;
}

async fn all_units_in_parallel(stores: Stores, n: usize) {
    let inq = inquiry(n);
    stores.inquiries.create(&inq).await.expect("create");
    let processor = Arc::new(ItemProcessor::new(
        Arc::clone(&stores.inquiries),
        Arc::clone(&stores.catalog),
    ));

    let handles: Vec<_> = units(&inq)
        .into_iter()
        .map(|unit| {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.process(&unit).await })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(n);
    for handle in handles {
        outcomes.push(handle.await.expect("join"));
    }

    let settled = stores
        .inquiries
        .load(&inq.id)
        .await
        .expect("load")
        .expect("present");
    let successes = outcomes
        .iter()
        .filter(|o| matches!(o, AttemptOutcome::Success { .. }))
        .count();
    let expected_processed = u32::try_from(successes).expect("fits");
    assert_eq!(settled.items_processed_count, expected_processed);
    assert_eq!(
        settled.items_processed_count + settled.items_failed_count,
        settled.items_total_count
    );
    assert!(settled.status.is_terminal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_units_fold_consistently_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    all_units_in_parallel(sqlite_stores(dir.path()).await, 64).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_units_fold_consistently_in_memory() {
    all_units_in_parallel(Stores::memory(), 200).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_terminal_writes_apply_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stores = sqlite_stores(dir.path()).await;
    let inq = inquiry(1);
    stores.inquiries.create(&inq).await.expect("create");
    stores
        .inquiries
        .increment_processed(&inq.id, "T-1")
        .await
        .expect("fold")
        .expect("counted");

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let inquiries = Arc::clone(&stores.inquiries);
            let id = inq.id.clone();
            let status = if i % 2 == 0 {
                InquiryStatus::Processed
            } else {
                InquiryStatus::Failed
            };
            tokio::spawn(async move { inquiries.try_set_terminal_status(&id, status).await })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        if handle.await.expect("join").expect("cas") {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn duplicate_folds_race_to_a_single_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stores = sqlite_stores(dir.path()).await;
    let inq = inquiry(2);
    stores.inquiries.create(&inq).await.expect("create");

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let inquiries = Arc::clone(&stores.inquiries);
            let id = inq.id.clone();
            tokio::spawn(async move { inquiries.increment_processed(&id, "T-1").await })
        })
        .collect();

    let mut counted = 0;
    for handle in handles {
        if handle.await.expect("join").expect("fold").is_some() {
            counted += 1;
        }
    }
    assert_eq!(counted, 1);

    let loaded = stores
        .inquiries
        .load(&inq.id)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.items_processed_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn worker_pool_settles_large_inquiry_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = Harness::start(sqlite_config(dir.path(), true)).await;

    let inquiry = harness.submit_items(100).await;
    harness.wait_idle().await;

    let settled = harness.inquiry(&inquiry.id).await;
    assert_eq!(settled.items_processed_count, 90);
    assert_eq!(settled.items_failed_count, 10);
    assert_eq!(settled.status, InquiryStatus::Failed);
    assert_eq!(harness.queue.failed_jobs().len(), 10);

    harness.shutdown().await;
}
