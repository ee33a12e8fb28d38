//! Fan-out of one inquiry into per-item units of work.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::persistence::InquiryStore;
use crate::Result;

use super::aggregator;
use super::queue::{Job, JobQueue};
use super::retry::RetryPolicy;
use super::ProcessingUnit;

/// Number of leading items marked for deterministic failure.
///
/// `floor(0.1 * total)` when simulation is enabled, otherwise zero.
#[must_use]
pub fn failure_quota(total: usize, simulate_failure: bool) -> usize {
    if simulate_failure {
        total / 10
    } else {
        0
    }
}

/// Schedules one [`ProcessingUnit`] per inquiry item.
pub struct Dispatcher {
    inquiries: Arc<dyn InquiryStore>,
    simulate_failure: bool,
    policy: RetryPolicy,
}

impl Dispatcher {
    /// Create a dispatcher handing `policy` to every unit it schedules.
    #[must_use]
    pub fn new(
        inquiries: Arc<dyn InquiryStore>,
        simulate_failure: bool,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inquiries,
            simulate_failure,
            policy,
        }
    }

    /// Enqueue one unit per item of `inquiry_id` and return how many were
    /// scheduled.
    ///
    /// A missing inquiry is logged and schedules nothing. Items whose
    /// outcome is already counted are skipped, so dispatching the same
    /// inquiry twice never double counts. Failure markers are derived from
    /// the item's position in the full stored list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails, or `AppError::Queue` if the
    /// transport is closed.
    pub async fn dispatch(&self, inquiry_id: &str, queue: &JobQueue) -> Result<usize> {
        let Some(inquiry) = self.inquiries.load(inquiry_id).await? else {
            warn!(inquiry_id, "inquiry not found; nothing dispatched");
            return Ok(0);
        };

        if inquiry.status.is_terminal() {
            debug!(inquiry_id, status = ?inquiry.status, "inquiry already settled");
            return Ok(0);
        }

        let total = inquiry.items.len();
        let fail_count = failure_quota(total, self.simulate_failure);
        let folded: HashSet<String> = self
            .inquiries
            .folded_refs(inquiry_id)
            .await?
            .into_iter()
            .collect();

        let mut scheduled = 0;
        for (position, item) in inquiry.items.iter().enumerate() {
            if folded.contains(&item.item_ref) {
                debug!(inquiry_id, item_ref = %item.item_ref, "outcome already counted; skipping");
                continue;
            }
            let unit = ProcessingUnit::new(
                inquiry_id.to_owned(),
                item.clone(),
                position < fail_count,
                self.policy,
            );
            queue.enqueue(Job::Process(unit))?;
            scheduled += 1;
        }

        // Covers empty inquiries and inquiries whose last fold committed its
        // counter but not the status.
        if scheduled == 0 {
            aggregator::settle_if_complete(self.inquiries.as_ref(), &inquiry).await?;
        }

        info!(inquiry_id, total, scheduled, fail_count, "inquiry dispatched");
        Ok(scheduled)
    }
}

/// Re-dispatch every inquiry still `ACTIVE`, returning how many were queued.
///
/// # Errors
///
/// Returns `AppError::Db` if the store fails, or `AppError::Queue` if the
/// transport is closed.
pub async fn redispatch_active(inquiries: &dyn InquiryStore, queue: &JobQueue) -> Result<usize> {
    let active = inquiries.list_active().await?;
    if active.is_empty() {
        info!("no active inquiries found on startup");
        return Ok(0);
    }

    info!(count = active.len(), "re-dispatching active inquiries");
    for inquiry_id in &active {
        queue.enqueue(Job::Dispatch {
            inquiry_id: inquiry_id.clone(),
        })?;
    }
    Ok(active.len())
}
