//! In-process store backing both [`InquiryStore`] and [`CatalogStore`].
//!
//! Every operation runs under one mutex, which gives the same serialized
//! counter semantics as the `SQLite` transaction. No lock is held across an
//! `.await`: each method computes its result up front and returns a ready
//! future.

use std::collections::HashMap;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::models::catalog::{CatalogRecord, RecordKind};
use crate::models::inquiry::{
    Inquiry, InquiryCounters, InquiryItem, InquiryStatus, ItemOutcome,
};
use crate::{AppError, Result};

use super::{CatalogStore, InquiryStore};

#[derive(Default)]
struct MemoryState {
    inquiries: HashMap<String, Inquiry>,
    outcomes: HashMap<String, HashMap<String, ItemOutcome>>,
    records: HashMap<String, CatalogRecord>,
}

/// Map-backed store; contents live as long as the value.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_outcome(
        &self,
        id: &str,
        item_ref: &str,
        outcome: ItemOutcome,
    ) -> Option<InquiryCounters> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let inquiry = state.inquiries.get_mut(id)?;
        if inquiry.counters().is_settled() {
            return None;
        }
        let folded = state.outcomes.entry(id.to_owned()).or_default();
        if folded.contains_key(item_ref) {
            return None;
        }
        folded.insert(item_ref.to_owned(), outcome);

        match outcome {
            ItemOutcome::Processed => inquiry.items_processed_count += 1,
            ItemOutcome::Failed => inquiry.items_failed_count += 1,
        }
        inquiry.updated_at = Utc::now();
        Some(inquiry.counters())
    }

    fn set_terminal_status(&self, id: &str, status: InquiryStatus) -> Result<bool> {
        if !status.is_terminal() {
            return Err(AppError::Db("ACTIVE is not a terminal inquiry status".into()));
        }

        let mut state = self.lock();
        let Some(inquiry) = state.inquiries.get_mut(id) else {
            return Ok(false);
        };
        if inquiry.status.is_terminal() || !inquiry.counters().is_settled() {
            return Ok(false);
        }
        inquiry.status = status;
        inquiry.updated_at = Utc::now();
        Ok(true)
    }

    fn upsert_item(&self, item: &InquiryItem) -> (CatalogRecord, bool) {
        let now = Utc::now();
        let mut state = self.lock();

        let (record, created) = match state.records.get(&item.item_ref) {
            Some(existing) => (
                CatalogRecord {
                    item_ref: item.item_ref.clone(),
                    name: item.name.clone(),
                    description: item.description.clone(),
                    kind: RecordKind::Updated,
                    is_active: true,
                    created_at: existing.created_at,
                    updated_at: now,
                },
                false,
            ),
            None => (
                CatalogRecord {
                    item_ref: item.item_ref.clone(),
                    name: item.name.clone(),
                    description: item.description.clone(),
                    kind: RecordKind::New,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                },
                true,
            ),
        };

        state.records.insert(record.item_ref.clone(), record.clone());
        (record, created)
    }
}

impl InquiryStore for MemoryStore {
    fn create<'a>(
        &'a self,
        inquiry: &'a Inquiry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let mut state = self.lock();
        let result = if state.inquiries.contains_key(&inquiry.id) {
            Err(AppError::Db(format!("inquiry {} already exists", inquiry.id)))
        } else {
            state.inquiries.insert(inquiry.id.clone(), inquiry.clone());
            Ok(())
        };
        Box::pin(future::ready(result))
    }

    fn load<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Inquiry>>> + Send + 'a>> {
        let inquiry = self.lock().inquiries.get(id).cloned();
        Box::pin(future::ready(Ok(inquiry)))
    }

    fn increment_processed<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InquiryCounters>>> + Send + 'a>> {
        let counters = self.record_outcome(id, item_ref, ItemOutcome::Processed);
        Box::pin(future::ready(Ok(counters)))
    }

    fn increment_failed<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InquiryCounters>>> + Send + 'a>> {
        let counters = self.record_outcome(id, item_ref, ItemOutcome::Failed);
        Box::pin(future::ready(Ok(counters)))
    }

    fn try_set_terminal_status<'a>(
        &'a self,
        id: &'a str,
        status: InquiryStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(future::ready(self.set_terminal_status(id, status)))
    }

    fn folded_refs<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        let refs = self
            .lock()
            .outcomes
            .get(id)
            .map(|folded| folded.keys().cloned().collect())
            .unwrap_or_default();
        Box::pin(future::ready(Ok(refs)))
    }

    fn recorded_outcome<'a>(
        &'a self,
        id: &'a str,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ItemOutcome>>> + Send + 'a>> {
        let outcome = self
            .lock()
            .outcomes
            .get(id)
            .and_then(|folded| folded.get(item_ref).copied());
        Box::pin(future::ready(Ok(outcome)))
    }

    fn list_active(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        let mut active: Vec<(chrono::DateTime<Utc>, String)> = self
            .lock()
            .inquiries
            .values()
            .filter(|inquiry| inquiry.status == InquiryStatus::Active)
            .map(|inquiry| (inquiry.created_at, inquiry.id.clone()))
            .collect();
        active.sort();
        let ids = active.into_iter().map(|(_, id)| id).collect();
        Box::pin(future::ready(Ok(ids)))
    }
}

impl CatalogStore for MemoryStore {
    fn upsert<'a>(
        &'a self,
        item: &'a InquiryItem,
    ) -> Pin<Box<dyn Future<Output = Result<(CatalogRecord, bool)>> + Send + 'a>> {
        let upserted = self.upsert_item(item);
        Box::pin(future::ready(Ok(upserted)))
    }

    fn get<'a>(
        &'a self,
        item_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CatalogRecord>>> + Send + 'a>> {
        let record = self.lock().records.get(item_ref).cloned();
        Box::pin(future::ready(Ok(record)))
    }

    fn set_active<'a>(
        &'a self,
        item_ref: &'a str,
        active: bool,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        let mut state = self.lock();
        let matched = match state.records.get_mut(item_ref) {
            Some(record) => {
                record.is_active = active;
                record.updated_at = Utc::now();
                true
            }
            None => false,
        };
        Box::pin(future::ready(Ok(matched)))
    }

    fn inactive_refs<'a>(
        &'a self,
        refs: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        let state = self.lock();
        let mut inactive: Vec<String> = refs
            .iter()
            .filter(|r| state.records.get(*r).is_some_and(|record| !record.is_active))
            .cloned()
            .collect();
        inactive.sort();
        inactive.dedup();
        Box::pin(future::ready(Ok(inactive)))
    }
}
