//! In-memory implementation of `RecordRepository`.
//!
//! All records are held in memory and lost on restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use proofdesk_core::{ArtNr, IngestSummary, ProductRecord, ReviewError, SourceItem};
use tokio::sync::RwLock;

use super::{ChangeFn, MergeFn, Modified, RecordFilter, RecordRepository, RepositoryError};

/// In-memory record repository.
///
/// Stores records in a `BTreeMap` protected by a `RwLock`, so listing is
/// ordered by article number without sorting.
pub struct InMemoryRepository {
    records: RwLock<BTreeMap<ArtNr, ProductRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRepository {
    async fn get(&self, art_nr: &ArtNr) -> Result<Option<ProductRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(art_nr).cloned())
    }

    async fn upsert(&self, record: ProductRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(record.art_nr.clone(), record);
        Ok(())
    }

    async fn modify(&self, art_nr: &ArtNr, change: ChangeFn) -> Result<Modified, ReviewError> {
        let mut records = self.records.write().await;
        let previous = records
            .get(art_nr)
            .cloned()
            .ok_or_else(|| ReviewError::not_found(art_nr))?;
        let current = change(previous.clone())?;
        records.insert(art_nr.clone(), current.clone());
        Ok(Modified { previous, current })
    }

    async fn merge_batch(
        &self,
        items: Vec<SourceItem>,
        merge: MergeFn,
    ) -> Result<IngestSummary, RepositoryError> {
        // One write guard for the whole batch, so readers never see half of it.
        let mut records = self.records.write().await;
        let mut summary = IngestSummary::default();
        for item in items {
            let existing = records.get(&item.art_nr).cloned();
            if existing.is_some() {
                summary.updated += 1;
            } else {
                summary.created += 1;
            }
            let record = merge(existing, item);
            records.insert(record.art_nr.clone(), record);
        }
        Ok(summary)
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<ProductRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }
}
