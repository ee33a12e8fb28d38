//! Per-item attempt logic.
//!
//! Counters are touched at most once per unit: on success, or on the final
//! attempt of a failing unit. Earlier failures only ask the transport for
//! another attempt.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::models::inquiry::ItemOutcome;
use crate::persistence::{CatalogStore, InquiryStore};
use crate::AppError;

use super::aggregator;
use super::retry::AttemptOutcome;
use super::ProcessingUnit;

/// Upserts one item and reports its outcome to the owning inquiry.
pub struct ItemProcessor {
    inquiries: Arc<dyn InquiryStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl ItemProcessor {
    /// Create a processor over the given stores.
    #[must_use]
    pub fn new(inquiries: Arc<dyn InquiryStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { inquiries, catalog }
    }

    /// Run one attempt of `unit`.
    pub async fn process(&self, unit: &ProcessingUnit) -> AttemptOutcome {
        match self.inquiries.load(&unit.inquiry_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    inquiry_id = %unit.inquiry_id,
                    item_ref = %unit.item.item_ref,
                    "inquiry not found; discarding unit"
                );
                return AttemptOutcome::Discarded;
            }
            Err(err) => return self.fail(unit, err).await,
        }

        if unit.simulate_failure {
            info!(
                inquiry_id = %unit.inquiry_id,
                item_ref = %unit.item.item_ref,
                attempt = unit.attempt,
                "simulating failure"
            );
            let err = AppError::SimulatedFailure(format!("ref {}", unit.item.item_ref));
            return self.fail(unit, err).await;
        }

        let kind = match self.catalog.upsert(&unit.item).await {
            Ok((record, _created)) => record.kind,
            Err(err) => return self.fail(unit, err).await,
        };

        match aggregator::fold_outcome(
            self.inquiries.as_ref(),
            &unit.inquiry_id,
            &unit.item.item_ref,
            ItemOutcome::Processed,
        )
        .await
        {
            Ok(_) => AttemptOutcome::Success { kind },
            Err(err) => self.fail(unit, err).await,
        }
    }

    /// Classify a failed attempt, counting it only when the budget is spent.
    async fn fail(&self, unit: &ProcessingUnit, err: AppError) -> AttemptOutcome {
        if !unit.is_final_attempt() {
            warn!(
                inquiry_id = %unit.inquiry_id,
                item_ref = %unit.item.item_ref,
                attempt = unit.attempt,
                %err,
                "attempt failed; retry pending"
            );
            return AttemptOutcome::RetryableFailure(err);
        }

        if let Err(fold_err) = aggregator::fold_outcome(
            self.inquiries.as_ref(),
            &unit.inquiry_id,
            &unit.item.item_ref,
            ItemOutcome::Failed,
        )
        .await
        {
            error!(
                inquiry_id = %unit.inquiry_id,
                item_ref = %unit.item.item_ref,
                %fold_err,
                "failed to count permanent failure"
            );
        }

        // A success whose status write failed is already in the ledger.
        match self
            .inquiries
            .recorded_outcome(&unit.inquiry_id, &unit.item.item_ref)
            .await
        {
            Ok(Some(ItemOutcome::Processed)) => {
                info!(
                    inquiry_id = %unit.inquiry_id,
                    item_ref = %unit.item.item_ref,
                    %err,
                    "unit already counted as processed"
                );
                return AttemptOutcome::AlreadyCounted;
            }
            Ok(_) => {}
            Err(lookup_err) => warn!(
                inquiry_id = %unit.inquiry_id,
                item_ref = %unit.item.item_ref,
                %lookup_err,
                "could not read recorded outcome"
            ),
        }

        AttemptOutcome::PermanentFailure(err)
    }
}
