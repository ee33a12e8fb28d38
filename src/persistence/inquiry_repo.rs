//! Inquiry repository for `SQLite` persistence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;

use crate::models::inquiry::{
    Inquiry, InquiryCounters, InquiryItem, InquiryStatus, ItemOutcome,
};
use crate::{AppError, Result};

use super::db::Database;
use super::InquiryStore;

/// Repository wrapper around `SQLite` for inquiry records.
#[derive(Clone)]
pub struct InquiryRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct InquiryRow {
    id: String,
    items: String,
    status: String,
    items_total_count: i64,
    items_processed_count: i64,
    items_failed_count: i64,
    created_at: String,
    updated_at: String,
}

impl InquiryRow {
    /// Convert a database row into the domain model.
    fn into_inquiry(self) -> Result<Inquiry> {
        let status = parse_inquiry_status(&self.status)?;
        let items: Vec<InquiryItem> = serde_json::from_str(&self.items)
            .map_err(|e| AppError::Db(format!("invalid items: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let updated_at = chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Inquiry {
            id: self.id,
            items,
            items_total_count: to_count(self.items_total_count, "items_total_count")?,
            items_processed_count: to_count(self.items_processed_count, "items_processed_count")?,
            items_failed_count: to_count(self.items_failed_count, "items_failed_count")?,
            status,
            created_at,
            updated_at,
        })
    }
}

/// Counter columns returned by an increment.
#[derive(sqlx::FromRow)]
struct CounterRow {
    items_total_count: i64,
    items_processed_count: i64,
    items_failed_count: i64,
}

impl CounterRow {
    fn into_counters(self) -> Result<InquiryCounters> {
        Ok(InquiryCounters {
            total: to_count(self.items_total_count, "items_total_count")?,
            processed: to_count(self.items_processed_count, "items_processed_count")?,
            failed: to_count(self.items_failed_count, "items_failed_count")?,
        })
    }
}

fn to_count(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| AppError::Db(format!("invalid {column}: {value}")))
}

fn parse_inquiry_status(s: &str) -> Result<InquiryStatus> {
    match s {
        "ACTIVE" => Ok(InquiryStatus::Active),
        "PROCESSED" => Ok(InquiryStatus::Processed),
        "FAILED" => Ok(InquiryStatus::Failed),
        other => Err(AppError::Db(format!("invalid inquiry status: {other}"))),
    }
}

fn inquiry_status_str(s: InquiryStatus) -> &'static str {
    match s {
        InquiryStatus::Active => "ACTIVE",
        InquiryStatus::Processed => "PROCESSED",
        InquiryStatus::Failed => "FAILED",
    }
}

fn outcome_str(outcome: ItemOutcome) -> &'static str {
    match outcome {
        ItemOutcome::Processed => "processed",
        ItemOutcome::Failed => "failed",
    }
}

fn parse_outcome(s: &str) -> Result<ItemOutcome> {
    match s {
        "processed" => Ok(ItemOutcome::Processed),
        "failed" => Ok(ItemOutcome::Failed),
        other => Err(AppError::Db(format!("invalid item outcome: {other}"))),
    }
}

fn increment_sql(outcome: ItemOutcome) -> &'static str {
    match outcome {
        ItemOutcome::Processed => {
            "UPDATE inquiry \
             SET items_processed_count = items_processed_count + 1, updated_at = ?1 \
             WHERE id = ?2 AND items_processed_count + items_failed_count < items_total_count \
             RETURNING items_total_count, items_processed_count, items_failed_count"
        }
        ItemOutcome::Failed => {
            "UPDATE inquiry \
             SET items_failed_count = items_failed_count + 1, updated_at = ?1 \
             WHERE id = ?2 AND items_processed_count + items_failed_count < items_total_count \
             RETURNING items_total_count, items_processed_count, items_failed_count"
        }
    }
}

impl InquiryRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new inquiry record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, inquiry: &Inquiry) -> Result<()> {
        let items = serde_json::to_string(&inquiry.items)?;

        sqlx::query(
            "INSERT INTO inquiry (id, items, status, items_total_count,
             items_processed_count, items_failed_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&inquiry.id)
        .bind(&items)
        .bind(inquiry_status_str(inquiry.status))
        .bind(i64::from(inquiry.items_total_count))
        .bind(i64::from(inquiry.items_processed_count))
        .bind(i64::from(inquiry.items_failed_count))
        .bind(inquiry.created_at.to_rfc3339())
        .bind(inquiry.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Retrieve an inquiry by its ID.
    ///
    /// Returns `Ok(None)` if the inquiry does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Inquiry>> {
        let row: Option<InquiryRow> = sqlx::query_as("SELECT * FROM inquiry WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(InquiryRow::into_inquiry).transpose()
    }

    /// Record `outcome` for `item_ref` and bump the matching counter.
    ///
    /// Both writes share one transaction, so the returned counters are a
    /// serialized view. A repeated outcome for the same ref, a missing
    /// inquiry, or a full inquiry rolls back and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the transaction fails.
    pub async fn record_outcome(
        &self,
        id: &str,
        item_ref: &str,
        outcome: ItemOutcome,
    ) -> Result<Option<InquiryCounters>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;

        let recorded = sqlx::query(
            "INSERT OR IGNORE INTO inquiry_item_outcome (inquiry_id, item_ref, outcome, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id)
        .bind(item_ref)
        .bind(outcome_str(outcome))
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            return Ok(None);
        }

        let row: Option<CounterRow> = sqlx::query_as(increment_sql(outcome))
            .bind(&now)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        tx.commit().await?;
        row.into_counters().map(Some)
    }

    /// Move an active, settled inquiry to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if `status` is `Active` or the update fails.
    pub async fn set_terminal_status(&self, id: &str, status: InquiryStatus) -> Result<bool> {
        if !status.is_terminal() {
            return Err(AppError::Db(format!(
                "{} is not a terminal inquiry status",
                inquiry_status_str(status)
            )));
        }

        let result = sqlx::query(
            "UPDATE inquiry SET status = ?1, updated_at = ?2 \
             WHERE id = ?3 AND status = 'ACTIVE' \
             AND items_processed_count + items_failed_count = items_total_count",
        )
        .bind(inquiry_status_str(status))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// List refs of `id` that already have a recorded outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_folded_refs(&self, id: &str) -> Result<Vec<String>> {
        let refs: Vec<String> = sqlx::query_scalar(
            "SELECT item_ref FROM inquiry_item_outcome WHERE inquiry_id = ?1",
        )
        .bind(id)
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(refs)
    }

    /// Look up the counted outcome of `item_ref` within `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the stored value is
    /// unknown.
    pub async fn find_outcome(&self, id: &str, item_ref: &str) -> Result<Option<ItemOutcome>> {
        let outcome: Option<String> = sqlx::query_scalar(
            "SELECT outcome FROM inquiry_item_outcome WHERE inquiry_id = ?1 AND item_ref = ?2",
        )
        .bind(id)
        .bind(item_ref)
        .fetch_optional(self.db.as_ref())
        .await?;

        outcome.as_deref().map(parse_outcome).transpose()
    }

    /// List ids of inquiries that are still `ACTIVE`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM inquiry WHERE status = 'ACTIVE' ORDER BY created_at ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(ids)
    }
}

impl InquiryStore for InquiryRepo {
    fn create<'a>(
        &'a self,
        inquiry: &'a Inquiry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(InquiryRepo::create(self, inquiry))
    }

    fn load<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Inquiry>>> + Send + 'a>> {
        Box::pin(self.get_by_id(id))
    }

    fn increment_processed<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InquiryCounters>>> + Send + 'a>> {
        Box::pin(self.record_outcome(id, item_ref, ItemOutcome::Processed))
    }

    fn increment_failed<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InquiryCounters>>> + Send + 'a>> {
        Box::pin(self.record_outcome(id, item_ref, ItemOutcome::Failed))
    }

    fn try_set_terminal_status<'a>(
        &'a self,
        id: &'a str,
        status: InquiryStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(self.set_terminal_status(id, status))
    }

    fn folded_refs<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(self.list_folded_refs(id))
    }

    fn recorded_outcome<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ItemOutcome>>> + Send + 'a>> {
        Box::pin(self.find_outcome(id, item_ref))
    }

    fn list_active(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        Box::pin(self.list_active_ids())
    }
}
