//! Folding of terminal item outcomes into inquiry counters.
//!
//! The store serializes every increment and hands back the counters as they
//! stood right after it. Exactly one increment can observe
//! `processed + failed == total`, so only that caller attempts the terminal
//! write, and the write itself is a compare-and-set against `ACTIVE`.
//!
//! A fold that counts nothing re-checks the stored counters, so an inquiry
//! whose last increment committed without its status write is settled by
//! the next fold for it.

use tracing::{debug, info, warn};

use crate::models::inquiry::{Inquiry, InquiryCounters, InquiryStatus, ItemOutcome};
use crate::persistence::InquiryStore;
use crate::Result;

/// What a fold changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldReport {
    /// Counters after the increment; `None` if nothing was counted.
    pub counters: Option<InquiryCounters>,
    /// Terminal status written by this fold, if any.
    pub settled: Option<InquiryStatus>,
}

impl FoldReport {
    /// Whether this fold incremented a counter.
    #[must_use]
    pub fn counted(&self) -> bool {
        self.counters.is_some()
    }
}

/// Count `outcome` for `item_ref` and settle the inquiry if it was the last
/// outstanding item.
///
/// A second fold for the same `(inquiry_id, item_ref)` changes nothing.
///
/// # Errors
///
/// Returns `AppError::Db` if the store fails.
pub async fn fold_outcome(
    store: &dyn InquiryStore,
    inquiry_id: &str,
    item_ref: &str,
    outcome: ItemOutcome,
) -> Result<FoldReport> {
    let counters = match outcome {
        ItemOutcome::Processed => store.increment_processed(inquiry_id, item_ref).await?,
        ItemOutcome::Failed => store.increment_failed(inquiry_id, item_ref).await?,
    };

    let Some(counters) = counters else {
        debug!(inquiry_id, item_ref, ?outcome, "outcome not counted");
        let settled = match store.load(inquiry_id).await? {
            Some(inquiry) => settle_if_complete(store, &inquiry).await?,
            None => None,
        };
        return Ok(FoldReport {
            counters: None,
            settled,
        });
    };

    let Some(status) = counters.settled_status() else {
        return Ok(FoldReport {
            counters: Some(counters),
            settled: None,
        });
    };

    let applied = store.try_set_terminal_status(inquiry_id, status).await?;
    if applied {
        info!(
            inquiry_id,
            ?status,
            processed = counters.processed,
            failed = counters.failed,
            "inquiry settled"
        );
    } else {
        warn!(inquiry_id, ?status, "terminal status was already written");
    }

    Ok(FoldReport {
        counters: Some(counters),
        settled: applied.then_some(status),
    })
}

/// Write the terminal status of an `ACTIVE` inquiry whose counters already
/// sum to its total.
///
/// Returns the status only when this call performed the transition.
///
/// # Errors
///
/// Returns `AppError::Db` if the store fails.
pub async fn settle_if_complete(
    store: &dyn InquiryStore,
    inquiry: &Inquiry,
) -> Result<Option<InquiryStatus>> {
    if inquiry.status.is_terminal() {
        return Ok(None);
    }
    let Some(status) = inquiry.counters().settled_status() else {
        return Ok(None);
    };

    let applied = store.try_set_terminal_status(&inquiry.id, status).await?;
    if applied {
        info!(inquiry_id = %inquiry.id, ?status, "pending settlement completed");
    }
    Ok(applied.then_some(status))
}
