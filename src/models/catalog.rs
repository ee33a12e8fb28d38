//! Catalog record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the most recent upsert created or replaced the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    /// The last upsert inserted the row.
    New,
    /// The last upsert replaced an existing row.
    Updated,
}

/// A persisted catalog entry keyed by `ref`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Unique stable key.
    #[serde(rename = "ref")]
    pub item_ref: String,
    /// Display name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Outcome of the latest upsert.
    pub kind: RecordKind,
    /// Whether the record accepts further submissions.
    pub is_active: bool,
    /// First insertion timestamp.
    pub created_at: DateTime<Utc>,
    /// Last upsert or activation change.
    pub updated_at: DateTime<Utc>,
}
