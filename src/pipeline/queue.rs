//! In-process job transport with a bounded worker pool.
//!
//! Jobs travel over an unbounded `mpsc` channel so that a running job can
//! always enqueue follow-up work (fan-out, retries) without blocking on the
//! workers it shares the pool with. Concurrency is bounded by a semaphore in
//! the receive loop instead.
//!
//! Every job is counted from the moment it is enqueued (or scheduled for a
//! delayed retry) until the worker running it returns, which is what
//! [`JobQueue::wait_idle`] observes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::{Pipeline, ProcessingUnit};
use crate::{AppError, Result};

/// A unit of work carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Fan an inquiry out into per-item jobs.
    Dispatch {
        /// Inquiry to dispatch.
        inquiry_id: String,
    },
    /// Run one attempt of one item.
    Process(ProcessingUnit),
}

impl Job {
    /// Short label used in spans and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dispatch { .. } => "dispatch",
            Self::Process(_) => "process",
        }
    }

    /// Inquiry this job belongs to.
    #[must_use]
    pub fn inquiry_id(&self) -> &str {
        match self {
            Self::Dispatch { inquiry_id } => inquiry_id,
            Self::Process(unit) => &unit.inquiry_id,
        }
    }
}

/// A unit that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedJob {
    /// Owning inquiry.
    pub inquiry_id: String,
    /// Ref of the failed item.
    pub item_ref: String,
    /// Attempts consumed, including the last.
    pub attempts: u32,
    /// Error reported by the final attempt.
    pub error: String,
    /// When the unit was given up on.
    pub failed_at: DateTime<Utc>,
}

impl FailedJob {
    /// Capture the final state of `unit`.
    #[must_use]
    pub fn new(unit: &ProcessingUnit, err: &AppError) -> Self {
        Self {
            inquiry_id: unit.inquiry_id.clone(),
            item_ref: unit.item.item_ref.clone(),
            attempts: unit.attempt,
            error: err.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Receiving half handed to [`spawn_job_workers`].
pub type JobReceiver = mpsc::UnboundedReceiver<Job>;

/// Cloneable handle for enqueueing jobs and observing the transport.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    failed: Arc<Mutex<Vec<FailedJob>>>,
}

impl JobQueue {
    /// Create a queue and the receiver its workers consume.
    #[must_use]
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            failed: Arc::new(Mutex::new(Vec::new())),
        };
        (queue, rx)
    }

    /// Enqueue a job for immediate execution.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the workers have shut down.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.finish();
            return Err(AppError::Queue("job queue is closed".into()));
        }
        Ok(())
    }

    /// Enqueue a job once `delay` has elapsed.
    ///
    /// The job counts as in flight while it waits.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the workers have already shut down.
    pub fn enqueue_after(&self, job: Job, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return self.enqueue(job);
        }
        if self.tx.is_closed() {
            return Err(AppError::Queue("job queue is closed".into()));
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = queue.tx.send(job) {
                warn!(inquiry_id = %err.0.inquiry_id(), "job queue closed before delayed job ran");
                queue.finish();
            }
        });
        Ok(())
    }

    /// Number of jobs queued, running, or waiting for a retry.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolve once no job is queued, running, or waiting for a retry.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Append a permanently failed unit to the dead-letter list.
    pub fn record_failure(&self, failed: FailedJob) {
        error!(
            inquiry_id = %failed.inquiry_id,
            item_ref = %failed.item_ref,
            attempts = failed.attempts,
            error = %failed.error,
            "unit failed permanently"
        );
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failed);
    }

    /// Snapshot of the dead-letter list.
    #[must_use]
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finish(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Spawn the receive loop that runs jobs on up to `workers` concurrent tasks.
///
/// The loop runs until the `CancellationToken` fires. Jobs already running
/// are left to finish; jobs still in the channel are dropped and are picked
/// up again by startup recovery.
#[must_use]
pub fn spawn_job_workers(
    queue: JobQueue,
    mut rx: JobReceiver,
    pipeline: Arc<Pipeline>,
    workers: usize,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        loop {
            let job = tokio::select! {
                () = cancel.cancelled() => {
                    info!("job workers shutting down");
                    break;
                }
                maybe_job = rx.recv() => {
                    if let Some(job) = maybe_job { job } else {
                        info!("job channel closed");
                        break;
                    }
                }
            };

            let permit = tokio::select! {
                () = cancel.cancelled() => {
                    queue.finish();
                    info!("job workers shutting down");
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => {
                    if let Ok(permit) = permit { permit } else {
                        queue.finish();
                        break;
                    }
                }
            };

            let span = info_span!("job", kind = job.kind(), inquiry_id = %job.inquiry_id());
            let pipeline = Arc::clone(&pipeline);
            let queue = queue.clone();
            tokio::spawn(
                async move {
                    pipeline.run(job, &queue).await;
                    queue.finish();
                    drop(permit);
                }
                .instrument(span),
            );
        }
    })
}
