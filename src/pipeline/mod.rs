//! Inquiry processing pipeline.
//!
//! A [`Job::Dispatch`] fans an inquiry out into one [`Job::Process`] per
//! item. Each unit is attempted by the [`processor::ItemProcessor`], retried
//! by the [`queue`] transport while its [`retry::RetryPolicy`] allows, and
//! folded into the inquiry's counters by the [`aggregator`] exactly once.

pub mod aggregator;
pub mod dispatcher;
pub mod processor;
pub mod queue;
pub mod retry;

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::GlobalConfig;
use crate::models::inquiry::InquiryItem;
use crate::persistence::{CatalogStore, InquiryStore};

use self::dispatcher::Dispatcher;
use self::processor::ItemProcessor;
use self::queue::{FailedJob, Job, JobQueue};
use self::retry::{AttemptOutcome, RetryPolicy};

/// One item scheduled for processing on behalf of an inquiry.
///
/// Identity is `(inquiry_id, item.item_ref)`; the transport may run the
/// same unit more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingUnit {
    /// Owning inquiry.
    pub inquiry_id: String,
    /// Payload to upsert.
    pub item: InquiryItem,
    /// Fail every attempt deterministically.
    pub simulate_failure: bool,
    /// 1-based attempt number of this run.
    pub attempt: u32,
    /// Attempt budget for this unit.
    pub policy: RetryPolicy,
}

impl ProcessingUnit {
    /// First attempt of a unit.
    #[must_use]
    pub fn new(
        inquiry_id: String,
        item: InquiryItem,
        simulate_failure: bool,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inquiry_id,
            item,
            simulate_failure,
            attempt: 1,
            policy,
        }
    }

    /// Whether this run is the last one the budget allows.
    #[must_use]
    pub fn is_final_attempt(&self) -> bool {
        self.policy.is_final_attempt(self.attempt)
    }

    /// The same unit, one attempt later.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Dispatcher and processor wired to the same stores.
pub struct Pipeline {
    dispatcher: Dispatcher,
    processor: ItemProcessor,
}

impl Pipeline {
    /// Build a pipeline over the given stores.
    #[must_use]
    pub fn new(
        inquiries: Arc<dyn InquiryStore>,
        catalog: Arc<dyn CatalogStore>,
        simulate_failure: bool,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&inquiries), simulate_failure, policy),
            processor: ItemProcessor::new(inquiries, catalog),
        }
    }

    /// Build a pipeline using the `[pipeline]` section of `config`.
    #[must_use]
    pub fn from_config(
        config: &GlobalConfig,
        inquiries: Arc<dyn InquiryStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self::new(
            inquiries,
            catalog,
            config.pipeline.simulate_failure,
            config.retry_policy(),
        )
    }

    /// The fan-out half of the pipeline.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The per-item half of the pipeline.
    #[must_use]
    pub fn processor(&self) -> &ItemProcessor {
        &self.processor
    }

    /// Execute one job and hand any follow-up work back to `queue`.
    pub async fn run(&self, job: Job, queue: &JobQueue) {
        match job {
            Job::Dispatch { inquiry_id } => {
                match self.dispatcher.dispatch(&inquiry_id, queue).await {
                    Ok(scheduled) => debug!(inquiry_id, scheduled, "dispatch complete"),
                    Err(err) => error!(inquiry_id, %err, "dispatch failed"),
                }
            }
            Job::Process(unit) => match self.processor.process(&unit).await {
                AttemptOutcome::Success { kind } => {
                    debug!(
                        inquiry_id = %unit.inquiry_id,
                        item_ref = %unit.item.item_ref,
                        ?kind,
                        "unit processed"
                    );
                }
                AttemptOutcome::RetryableFailure(err) => {
                    let next = unit.next_attempt();
                    debug!(
                        inquiry_id = %unit.inquiry_id,
                        item_ref = %unit.item.item_ref,
                        next_attempt = next.attempt,
                        %err,
                        "scheduling retry"
                    );
                    let delay = unit.policy.backoff();
                    if let Err(queue_err) = queue.enqueue_after(Job::Process(next), delay) {
                        warn!(
                            inquiry_id = %unit.inquiry_id,
                            item_ref = %unit.item.item_ref,
                            %queue_err,
                            "retry could not be scheduled"
                        );
                    }
                }
                AttemptOutcome::PermanentFailure(err) => {
                    queue.record_failure(FailedJob::new(&unit, &err));
                }
                AttemptOutcome::AlreadyCounted => {
                    debug!(
                        inquiry_id = %unit.inquiry_id,
                        item_ref = %unit.item.item_ref,
                        "unit was counted by an earlier attempt"
                    );
                }
                AttemptOutcome::Discarded => {}
            },
        }
    }
}
