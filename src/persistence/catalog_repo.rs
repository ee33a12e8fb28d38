//! Catalog record repository for `SQLite` persistence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;

use crate::models::catalog::{CatalogRecord, RecordKind};
use crate::models::inquiry::InquiryItem;
use crate::{AppError, Result};

use super::db::Database;
use super::CatalogStore;

/// Repository wrapper around `SQLite` for catalog records.
#[derive(Clone)]
pub struct CatalogRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CatalogRow {
    item_ref: String,
    name: String,
    description: Option<String>,
    kind: String,
    is_active: i64,
    created_at: String,
    updated_at: String,
}

impl CatalogRow {
    /// Convert a database row into the domain model.
    fn into_record(self) -> Result<CatalogRecord> {
        let kind = parse_record_kind(&self.kind)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let updated_at = chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(CatalogRecord {
            item_ref: self.item_ref,
            name: self.name,
            description: self.description,
            kind,
            is_active: self.is_active != 0,
            created_at,
            updated_at,
        })
    }
}

fn parse_record_kind(s: &str) -> Result<RecordKind> {
    match s {
        "NEW" => Ok(RecordKind::New),
        "UPDATED" => Ok(RecordKind::Updated),
        other => Err(AppError::Db(format!("invalid record kind: {other}"))),
    }
}

impl CatalogRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a record keyed by ref in a single statement.
    ///
    /// Inserted rows are stamped `NEW`; conflicting rows are rewritten and
    /// stamped `UPDATED`, keeping their original `created_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn upsert_item(&self, item: &InquiryItem) -> Result<(CatalogRecord, bool)> {
        let now = Utc::now().to_rfc3339();

        let row: CatalogRow = sqlx::query_as(
            "INSERT INTO catalog_record (item_ref, name, description, kind, is_active,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, 'NEW', 1, ?4, ?4)
             ON CONFLICT(item_ref) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 kind = 'UPDATED',
                 is_active = 1,
                 updated_at = excluded.updated_at
             RETURNING item_ref, name, description, kind, is_active, created_at, updated_at",
        )
        .bind(&item.item_ref)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&now)
        .fetch_one(self.db.as_ref())
        .await?;

        let record = row.into_record()?;
        let created = record.kind == RecordKind::New;
        Ok((record, created))
    }

    /// Retrieve a record by ref.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_ref(&self, item_ref: &str) -> Result<Option<CatalogRecord>> {
        let row: Option<CatalogRow> =
            sqlx::query_as("SELECT * FROM catalog_record WHERE item_ref = ?1")
                .bind(item_ref)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(CatalogRow::into_record).transpose()
    }

    /// Update the activation flag on a record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_active(&self, item_ref: &str, active: bool) -> Result<bool> {
        let result =
            sqlx::query("UPDATE catalog_record SET is_active = ?1, updated_at = ?2 WHERE item_ref = ?3")
                .bind(i64::from(active))
                .bind(Utc::now().to_rfc3339())
                .bind(item_ref)
                .execute(self.db.as_ref())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Return the refs among `refs` that exist and are deactivated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_inactive(&self, refs: &[String]) -> Result<Vec<String>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let refs_json = serde_json::to_string(refs)?;

        let inactive: Vec<String> = sqlx::query_scalar(
            "SELECT item_ref FROM catalog_record \
             WHERE is_active = 0 AND item_ref IN (SELECT value FROM json_each(?1)) \
             ORDER BY item_ref",
        )
        .bind(&refs_json)
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(inactive)
    }
}

impl CatalogStore for CatalogRepo {
    fn upsert<'a>(
        &'a self,
        item: &'a InquiryItem,
    ) -> Pin<Box<dyn Future<Output = Result<(CatalogRecord, bool)>> + Send + 'a>> {
        Box::pin(self.upsert_item(item))
    }

    fn get<'a>(
        &'a self,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CatalogRecord>>> + Send + 'a>> {
        Box::pin(self.get_by_ref(item_ref))
    }

    fn set_active<'a>(
        &'a self,
        item_ref: &'a str,
        active: bool,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(self.update_active(item_ref, active))
    }

    fn inactive_refs<'a>(
        &'a self,
        refs: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(self.list_inactive(refs))
    }
}
