//! Persistence layer modules.
//!
//! The pipeline only talks to the [`InquiryStore`] and [`CatalogStore`]
//! traits. [`inquiry_repo`] and [`catalog_repo`] back them with `SQLite`;
//! [`memory::MemoryStore`] backs both with process-local maps.

pub mod catalog_repo;
pub mod db;
pub mod inquiry_repo;
pub mod memory;
pub mod schema;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use crate::config::{GlobalConfig, StorageBackend};
use crate::models::catalog::CatalogRecord;
use crate::models::inquiry::{
    Inquiry, InquiryCounters, InquiryItem, InquiryStatus, ItemOutcome,
};
use crate::Result;

use self::catalog_repo::CatalogRepo;
use self::inquiry_repo::InquiryRepo;
use self::memory::MemoryStore;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Persistent record of submitted batches and their aggregate state.
///
/// Counter increments are serialized per inquiry by every implementation:
/// the snapshot returned from an increment reflects that increment and all
/// increments ordered before it, and nothing else.
pub trait InquiryStore: Send + Sync {
    /// Persist a freshly created inquiry.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the insert fails.
    fn create<'a>(
        &'a self,
        inquiry: &'a Inquiry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Load an inquiry by id, returning `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the query fails.
    fn load<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Inquiry>>> + Send + 'a>>;

    /// Count `item_ref` as processed and return the resulting counters.
    ///
    /// Returns `None` without changing anything when the inquiry does not
    /// exist, is already full, or already has an outcome for `item_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the update fails.
    fn increment_processed<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InquiryCounters>>> + Send + 'a>>;

    /// Count `item_ref` as failed and return the resulting counters.
    ///
    /// Same `None` contract as [`increment_processed`](Self::increment_processed).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the update fails.
    fn increment_failed<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InquiryCounters>>> + Send + 'a>>;

    /// Write a terminal status if the inquiry is still active and settled.
    ///
    /// Returns `true` only for the call that performed the transition.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if `status` is not terminal
    /// or the update fails.
    fn try_set_terminal_status<'a>(
        &'a self,
        id: &'a str,
        status: InquiryStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Refs of `id` whose outcome has already been counted.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the query fails.
    fn folded_refs<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

    /// Outcome counted for `item_ref` within `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the query fails.
    fn recorded_outcome<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ItemOutcome>>> + Send + 'a>>;

    /// Ids of all inquiries still `ACTIVE`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the query fails.
    fn list_active(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>>;
}

/// Persistent keyed table of catalog records.
pub trait CatalogStore: Send + Sync {
    /// Insert or replace the record for `item.item_ref`, marking it active.
    ///
    /// Returns the stored record and whether this call created it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the write fails.
    fn upsert<'a>(
        &'a self,
        item: &'a InquiryItem,
    ) -> Pin<Box<dyn Future<Output = Result<(CatalogRecord, bool)>> + Send + 'a>>;

    /// Fetch a record by ref.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the query fails.
    fn get<'a>(
        &'a self,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CatalogRecord>>> + Send + 'a>>;

    /// Set the activation flag, returning `false` if no record matched.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the update fails.
    fn set_active<'a>(
        &'a self,
        item_ref: &'a str,
        active: bool,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Subset of `refs` that exist and are deactivated.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) if the query fails.
    fn inactive_refs<'a>(
        &'a self,
        refs: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;
}

/// Store handles shared by the intake layer and the pipeline.
#[derive(Clone)]
pub struct Stores {
    /// Inquiry persistence.
    pub inquiries: Arc<dyn InquiryStore>,
    /// Catalog persistence.
    pub catalog: Arc<dyn CatalogStore>,
}

impl Stores {
    /// Both traits backed by one fresh [`MemoryStore`].
    #[must_use]
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            inquiries: Arc::clone(&store) as Arc<dyn InquiryStore>,
            catalog: store,
        }
    }

    /// Both traits backed by repositories over `db`.
    #[must_use]
    pub fn sqlite(db: Arc<db::Database>) -> Self {
        Self {
            inquiries: Arc::new(InquiryRepo::new(Arc::clone(&db))),
            catalog: Arc::new(CatalogRepo::new(db)),
        }
    }
}

/// Open the backend selected by `config.storage`.
///
/// # Errors
///
/// Returns `AppError::Db` if the `SQLite` database cannot be opened.
pub async fn open_stores(config: &GlobalConfig) -> Result<Stores> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage; data is lost on exit");
            Ok(Stores::memory())
        }
        StorageBackend::Sqlite => {
            let db = db::connect(&config.database_path).await?;
            info!(path = %config.database_path.display(), "database connected");
            Ok(Stores::sqlite(Arc::new(db)))
        }
    }
}
