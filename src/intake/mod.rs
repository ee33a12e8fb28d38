//! Submission and activation collaborators around the pipeline.
//!
//! [`IntakeService`] validates incoming batches, persists them as inquiries,
//! and hands them to the job queue. It also exposes read-back of inquiries
//! and records and the activation toggles on catalog records.

pub mod validation;

use std::sync::Arc;

use tracing::info;

use crate::models::catalog::CatalogRecord;
use crate::models::inquiry::Inquiry;
use crate::persistence::{CatalogStore, InquiryStore};
use crate::pipeline::queue::{Job, JobQueue};
use crate::{AppError, Result};

use self::validation::{require_ref, validate_batch, SubmittedItem};

/// Front door for batch submission and record activation.
#[derive(Clone)]
pub struct IntakeService {
    inquiries: Arc<dyn InquiryStore>,
    catalog: Arc<dyn CatalogStore>,
    queue: JobQueue,
    max_batch_items: usize,
}

impl IntakeService {
    /// Create a service over the given stores and queue.
    #[must_use]
    pub fn new(
        inquiries: Arc<dyn InquiryStore>,
        catalog: Arc<dyn CatalogStore>,
        queue: JobQueue,
        max_batch_items: usize,
    ) -> Self {
        Self {
            inquiries,
            catalog,
            queue,
            max_batch_items,
        }
    }

    /// Validate and persist a batch, then schedule its dispatch.
    ///
    /// Returns `Ok(None)` for an empty batch; nothing is created.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the batch is rejected,
    /// `AppError::Db` if persistence fails, or `AppError::Queue` if the
    /// dispatch job cannot be enqueued.
    pub async fn submit(&self, items: Vec<SubmittedItem>) -> Result<Option<Inquiry>> {
        if items.is_empty() {
            return Ok(None);
        }

        let items = validate_batch(items, self.max_batch_items)?;

        let refs: Vec<String> = items.iter().map(|item| item.item_ref.clone()).collect();
        let inactive = self.catalog.inactive_refs(&refs).await?;
        if !inactive.is_empty() {
            return Err(AppError::Validation(
                "One or more items are inactive and cannot be processed.".into(),
            ));
        }

        let inquiry = Inquiry::new(items);
        self.inquiries.create(&inquiry).await?;
        self.queue.enqueue(Job::Dispatch {
            inquiry_id: inquiry.id.clone(),
        })?;

        info!(
            inquiry_id = %inquiry.id,
            items = inquiry.items_total_count,
            "inquiry accepted"
        );
        Ok(Some(inquiry))
    }

    /// Fetch an inquiry by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the inquiry does not exist.
    pub async fn inquiry(&self, id: &str) -> Result<Inquiry> {
        self.inquiries
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("inquiry {id} not found")))
    }

    /// Fetch a catalog record by ref.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the record does not exist.
    pub async fn record(&self, item_ref: &str) -> Result<CatalogRecord> {
        self.catalog
            .get(item_ref)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("record {item_ref} not found")))
    }

    /// Mark a record active.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the ref is missing, unknown, or
    /// already active.
    pub async fn activate(&self, item_ref: Option<&str>) -> Result<()> {
        self.toggle(item_ref, true).await
    }

    /// Mark a record inactive so later batches containing it are rejected.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the ref is missing, unknown, or
    /// already inactive.
    pub async fn deactivate(&self, item_ref: Option<&str>) -> Result<()> {
        self.toggle(item_ref, false).await
    }

    async fn toggle(&self, item_ref: Option<&str>, active: bool) -> Result<()> {
        let item_ref = require_ref(item_ref)?;

        let Some(record) = self.catalog.get(item_ref).await? else {
            return Err(AppError::Validation(
                "The record with the given reference ID does not exist.".into(),
            ));
        };

        if record.is_active == active {
            let state = if active { "active" } else { "inactive" };
            return Err(AppError::Validation(format!(
                "The record with the given reference ID is already {state}."
            )));
        }

        if !self.catalog.set_active(item_ref, active).await? {
            return Err(AppError::Validation(
                "The record with the given reference ID does not exist.".into(),
            ));
        }

        info!(item_ref, active, "record activation changed");
        Ok(())
    }
}
