//! Field-level checks for submitted batches and activation requests.
//!
//! Only the first failing rule is reported, mirroring how the API surfaces
//! a single `message` to callers.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::inquiry::InquiryItem;
use crate::{AppError, Result};

/// Longest accepted item name, in characters.
pub const MAX_NAME_LEN: usize = 255;

#[allow(clippy::expect_used)] // Literal pattern; covered by unit tests.
static REF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T-\d+$").expect("valid ref pattern"));

/// An item as received from a caller, before validation.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SubmittedItem {
    /// Catalog key; required.
    #[serde(rename = "ref", default)]
    pub item_ref: Option<String>,
    /// Display name; required.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

impl SubmittedItem {
    /// Convenience constructor for a fully populated item.
    #[must_use]
    pub fn new(item_ref: &str, name: &str, description: Option<&str>) -> Self {
        Self {
            item_ref: Some(item_ref.to_owned()),
            name: Some(name.to_owned()),
            description: description.map(str::to_owned),
        }
    }
}

/// Whether `item_ref` has the `T-<digits>` shape.
#[must_use]
pub fn is_valid_ref(item_ref: &str) -> bool {
    REF_PATTERN.is_match(item_ref)
}

/// Validate a batch and convert it into inquiry items, preserving order.
///
/// # Errors
///
/// Returns `AppError::Validation` describing the first failing rule.
pub fn validate_batch(items: Vec<SubmittedItem>, max_items: usize) -> Result<Vec<InquiryItem>> {
    if items.len() > max_items {
        return Err(AppError::Validation(format!(
            "A maximum of {max_items} items are allowed."
        )));
    }

    let mut seen = HashSet::with_capacity(items.len());
    let mut validated = Vec::with_capacity(items.len());

    for item in items {
        let item_ref = item
            .item_ref
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| AppError::Validation("A ref is required for each item.".into()))?;
        if !is_valid_ref(&item_ref) {
            return Err(AppError::Validation(
                "Each ref must follow the format T-[number].".into(),
            ));
        }
        if !seen.insert(item_ref.clone()) {
            return Err(AppError::Validation(
                "Each ref in the list must be unique.".into(),
            ));
        }

        let name = item
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| AppError::Validation("A name is required for each item.".into()))?;
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::Validation(format!(
                "The name may not be greater than {MAX_NAME_LEN} characters."
            )));
        }

        validated.push(InquiryItem::new(item_ref, name, item.description));
    }

    Ok(validated)
}

/// Validate the `ref` of an activation request.
///
/// # Errors
///
/// Returns `AppError::Validation` if the ref is absent or blank.
pub fn require_ref(item_ref: Option<&str>) -> Result<&str> {
    item_ref
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::Validation("A reference ID is required.".into()))
}
