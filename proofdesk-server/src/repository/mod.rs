//! Repository abstraction for product record persistence.
//!
//! This module defines the `RecordRepository` trait that abstracts storage
//! of product records. Every write is a read-modify-write that the backend
//! runs as one unit, so several processes may share a SQLite file. The
//! `RecordStore` orders callers within one process on top of that.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use proofdesk_core::{ArtNr, IngestSummary, ProductRecord, ReviewError, ReviewStatus, SourceItem};
use thiserror::Error;

/// Failure inside a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{operation} failed: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
    #[error("corrupt {what} in storage")]
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

impl From<RepositoryError> for ReviewError {
    fn from(e: RepositoryError) -> Self {
        ReviewError::Storage(e.to_string())
    }
}

/// Selection criteria for listing records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub status: Option<ReviewStatus>,
    /// Case-insensitive substring of the article number or name.
    pub text: Option<String>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: ReviewStatus) -> Self {
        Self {
            status: Some(status),
            text: None,
        }
    }

    /// Set the text filter; blank text means no text filter.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
        self
    }

    pub fn matches_status(&self, record: &ProductRecord) -> bool {
        self.status.map_or(true, |s| record.review_status == s)
    }

    pub fn matches_text(&self, record: &ProductRecord) -> bool {
        match &self.text {
            None => true,
            Some(text) => {
                let needle = text.to_lowercase();
                record.art_nr.as_str().to_lowercase().contains(&needle)
                    || record.name.to_lowercase().contains(&needle)
            }
        }
    }

    pub fn matches(&self, record: &ProductRecord) -> bool {
        self.matches_status(record) && self.matches_text(record)
    }
}

/// Checked change of one stored record. An error leaves the record untouched.
pub type ChangeFn = Box<dyn FnOnce(ProductRecord) -> Result<ProductRecord, ReviewError> + Send>;

/// Combines the stored record, if any, with an extracted item.
pub type MergeFn = Box<dyn Fn(Option<ProductRecord>, SourceItem) -> ProductRecord + Send>;

/// A record as read and as written by one `modify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modified {
    pub previous: ProductRecord,
    pub current: ProductRecord,
}

/// Keyed storage of product records.
///
/// `list` returns records ordered by article number ascending.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Get a record, returning None if not found.
    async fn get(&self, art_nr: &ArtNr) -> Result<Option<ProductRecord>, RepositoryError>;

    /// Store a record as given (upsert semantics).
    async fn upsert(&self, record: ProductRecord) -> Result<(), RepositoryError>;

    /// Read one record, apply `change` and write the result, with no other
    /// writer in between.
    ///
    /// Fails with `NotFound` for an unknown key, or with whatever `change`
    /// returns; nothing is written in either case.
    async fn modify(&self, art_nr: &ArtNr, change: ChangeFn) -> Result<Modified, ReviewError>;

    /// Read, merge and write every item as one unit: either all persist or
    /// none do, and no other writer runs in between.
    async fn merge_batch(
        &self,
        items: Vec<SourceItem>,
        merge: MergeFn,
    ) -> Result<IngestSummary, RepositoryError>;

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<ProductRecord>, RepositoryError>;
}

#[cfg(test)]
pub(crate) async fn seed(repository: &dyn RecordRepository, records: Vec<ProductRecord>) {
    for record in records {
        repository.upsert(record).await.unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(art_nr: &str, name: &str) -> ProductRecord {
        let mut record = ProductRecord::new(ArtNr::from(art_nr), Utc::now());
        record.name = name.to_string();
        record
    }

    #[test]
    fn test_text_filter_is_case_insensitive_on_name_and_key() {
        let filter = RecordFilter::all().text("FREUDE");
        assert!(filter.matches(&record("6381", "Farbenfreude")));
        assert!(!filter.matches(&record("6382", "Pinselwelt")));

        let by_key = RecordFilter::all().text("638");
        assert!(by_key.matches(&record("6381", "x")));
    }

    #[test]
    fn test_text_filter_folds_umlauts() {
        let filter = RecordFilter::all().text("ÖL");
        assert!(filter.matches(&record("1000", "Ölfarben")));
    }

    #[test]
    fn test_blank_text_is_no_filter() {
        assert_eq!(RecordFilter::all().text("  ").text, None);
    }

    #[test]
    fn test_status_filter() {
        let filter = RecordFilter::with_status(ReviewStatus::Approved);
        let mut approved = record("1000", "a");
        approved.review_status = ReviewStatus::Approved;
        assert!(filter.matches(&approved));
        assert!(!filter.matches(&record("1001", "b")));
    }

    #[test]
    fn test_repository_error_becomes_storage_error() {
        let err: ReviewError = RepositoryError::storage("get", "disk full").into();
        assert_eq!(err, ReviewError::Storage("get failed: disk full".to_string()));
    }
}
