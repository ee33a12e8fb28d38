//! Startup recovery of inquiries left `ACTIVE` by an interrupted run.

use catalog_intake::models::inquiry::{Inquiry, InquiryItem, InquiryStatus};
use catalog_intake::persistence;
use catalog_intake::pipeline::dispatcher::redispatch_active;

use super::test_helpers::{sqlite_config, Harness};

fn inquiry(n: usize) -> Inquiry {
    Inquiry::new(
        (1..=n)
            .map(|i| InquiryItem::new(format!("T-{i}"), format!("item {i}"), None))
            .collect(),
    )
}

#[tokio::test]
async fn interrupted_inquiry_is_finished_after_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = sqlite_config(dir.path(), false);

    // First run: one of four items was counted before the process died.
    let inq = inquiry(4);
    {
        let stores = persistence::open_stores(&config).await.expect("stores");
        stores.inquiries.create(&inq).await.expect("create");
        stores
            .catalog
            .upsert(&inq.items[1])
            .await
            .expect("upsert");
        stores
            .inquiries
            .increment_processed(&inq.id, "T-2")
            .await
            .expect("fold")
            .expect("counted");
    }

    // Second run.
    let harness = Harness::start(config).await;
    let queued = redispatch_active(harness.stores.inquiries.as_ref(), &harness.queue)
        .await
        .expect("recover");
    assert_eq!(queued, 1);
    harness.wait_idle().await;

    let settled = harness.inquiry(&inq.id).await;
    assert_eq!(settled.items_processed_count, 4);
    assert_eq!(settled.items_failed_count, 0);
    assert_eq!(settled.status, InquiryStatus::Processed);

    harness.shutdown().await;
}

#[tokio::test]
async fn counted_but_unsettled_inquiry_is_settled_on_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = sqlite_config(dir.path(), false);

    // The last fold committed but the status write never happened.
    let inq = inquiry(2);
    {
        let stores = persistence::open_stores(&config).await.expect("stores");
        stores.inquiries.create(&inq).await.expect("create");
        stores
            .inquiries
            .increment_processed(&inq.id, "T-1")
            .await
            .expect("fold");
        stores
            .inquiries
            .increment_failed(&inq.id, "T-2")
            .await
            .expect("fold");
    }

    let harness = Harness::start(config).await;
    redispatch_active(harness.stores.inquiries.as_ref(), &harness.queue)
        .await
        .expect("recover");
    harness.wait_idle().await;

    let settled = harness.inquiry(&inq.id).await;
    assert_eq!(settled.status, InquiryStatus::Failed);
    assert_eq!(settled.items_processed_count, 1);
    assert_eq!(settled.items_failed_count, 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn nothing_to_recover_on_clean_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = Harness::start(sqlite_config(dir.path(), false)).await;

    let queued = redispatch_active(harness.stores.inquiries.as_ref(), &harness.queue)
        .await
        .expect("recover");
    assert_eq!(queued, 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn settled_inquiries_are_not_recovered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = sqlite_config(dir.path(), false);

    let first = Harness::start(config.clone()).await;
    let inq = first.submit_items(3).await;
    first.wait_idle().await;
    assert_eq!(first.inquiry(&inq.id).await.status, InquiryStatus::Processed);
    first.shutdown().await;

    let second = Harness::start(config).await;
    let queued = redispatch_active(second.stores.inquiries.as_ref(), &second.queue)
        .await
        .expect("recover");
    assert_eq!(queued, 0);

    second.shutdown().await;
}
