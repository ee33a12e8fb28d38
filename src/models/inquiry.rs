//! Inquiry model: one submitted batch and its aggregate processing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for an inquiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InquiryStatus {
    /// Items are still outstanding.
    Active,
    /// Every item was upserted successfully.
    Processed,
    /// Every item was attempted and at least one failed permanently.
    Failed,
}

impl InquiryStatus {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Terminal outcome of one item, counted once per inquiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The item was upserted.
    Processed,
    /// The item exhausted its retry budget.
    Failed,
}

/// One record submitted as part of an inquiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InquiryItem {
    /// Stable catalog key, e.g. `T-42`.
    #[serde(rename = "ref")]
    pub item_ref: String,
    /// Display name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl InquiryItem {
    /// Construct an item from its parts.
    #[must_use]
    pub fn new(
        item_ref: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            item_ref: item_ref.into(),
            name: name.into(),
            description,
        }
    }
}

/// Consistent snapshot of an inquiry's counters taken right after an increment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InquiryCounters {
    /// Number of items in the inquiry.
    pub total: u32,
    /// Items upserted successfully.
    pub processed: u32,
    /// Items that exhausted their retry budget.
    pub failed: u32,
}

impl InquiryCounters {
    /// Whether every item has a terminal outcome.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.processed + self.failed == self.total
    }

    /// Terminal status implied by these counters, if settled.
    #[must_use]
    pub fn settled_status(&self) -> Option<InquiryStatus> {
        if !self.is_settled() {
            return None;
        }
        if self.failed > 0 {
            Some(InquiryStatus::Failed)
        } else {
            Some(InquiryStatus::Processed)
        }
    }
}

/// A submitted batch of items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inquiry {
    /// Unique record identifier.
    pub id: String,
    /// Items captured at submission time, in submission order.
    pub items: Vec<InquiryItem>,
    /// Fixed at creation to `items.len()`.
    pub items_total_count: u32,
    /// Items upserted successfully.
    pub items_processed_count: u32,
    /// Items that failed permanently.
    pub items_failed_count: u32,
    /// Current lifecycle status.
    pub status: InquiryStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last counter or status change.
    pub updated_at: DateTime<Utc>,
}

impl Inquiry {
    /// Construct a new active inquiry over `items`.
    ///
    /// The total saturates at `u32::MAX`; the submission layer caps batches
    /// well below that.
    #[must_use]
    pub fn new(items: Vec<InquiryItem>) -> Self {
        let now = Utc::now();
        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        Self {
            id: Uuid::new_v4().to_string(),
            items,
            items_total_count: total,
            items_processed_count: 0,
            items_failed_count: 0,
            status: InquiryStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current counter snapshot.
    #[must_use]
    pub fn counters(&self) -> InquiryCounters {
        InquiryCounters {
            total: self.items_total_count,
            processed: self.items_processed_count,
            failed: self.items_failed_count,
        }
    }
}
