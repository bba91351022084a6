//! Merging freshly extracted document items into stored records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::{ArtNr, ProductRecord, ReviewStatus};

/// One product section extracted from a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub art_nr: ArtNr,
    pub name: String,
    pub source_description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Drop any lock on re-ingested records along with their review state.
    pub clear_locks: bool,
}

/// Counts reported back after an ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub created: usize,
    pub updated: usize,
}

impl IngestSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

/// Collapse duplicate article numbers, keeping the last occurrence of each.
///
/// The result is ordered by article number.
pub fn dedupe_last_wins(items: impl IntoIterator<Item = SourceItem>) -> Vec<SourceItem> {
    let mut by_key: BTreeMap<ArtNr, SourceItem> = BTreeMap::new();
    for item in items {
        by_key.insert(item.art_nr.clone(), item);
    }
    by_key.into_values().collect()
}

/// Merge `item` into the existing record for its article number, or into a
/// new default record.
///
/// Name and source text are overwritten and the review restarts at
/// `pending`. Editor text, generated text and QA notes survive. Lock fields
/// are left alone unless `options.clear_locks` is set.
pub fn merge_item(
    existing: Option<ProductRecord>,
    item: SourceItem,
    actor: &str,
    now: DateTime<Utc>,
    options: IngestOptions,
) -> ProductRecord {
    let mut record = existing.unwrap_or_else(|| ProductRecord::new(item.art_nr.clone(), now));
    record.name = item.name;
    record.source_description = item.source_description;
    record.review_status = ReviewStatus::Pending;
    if options.clear_locks {
        record.clear_lock();
    }
    record.touch(actor, now);
    record
}
