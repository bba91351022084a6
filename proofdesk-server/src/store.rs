//! Per-record serialized access to a `RecordRepository`.
//!
//! Every read-modify-write of one article number runs under that key's
//! mutex, so two editors acting on the same record are applied one after
//! the other. Different keys never block each other. The repository makes
//! each write atomic against other processes sharing the storage.
//!
//! A key's mutex exists only while some task holds or waits for it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use proofdesk_core::export::select_approved;
use proofdesk_core::ingest::{dedupe_last_wins, merge_item};
use proofdesk_core::{
    ArtNr, ExportRow, IngestOptions, IngestSummary, ProductRecord, ReviewError, ReviewStatus,
    SourceItem,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::repository::{InMemoryRepository, MergeFn, Modified, RecordFilter, RecordRepository};

pub struct RecordStore {
    repository: Arc<dyn RecordRepository>,
    record_locks: RwLock<HashMap<ArtNr, Arc<Mutex<()>>>>,
}

impl RecordStore {
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            repository,
            record_locks: RwLock::new(HashMap::new()),
        }
    }

    /// A store backed by an `InMemoryRepository` (for testing).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRepository::new()))
    }

    /// Get or create the mutex serializing access to one record.
    async fn get_or_create_record_lock(&self, art_nr: &ArtNr) -> Arc<Mutex<()>> {
        {
            let locks = self.record_locks.read().await;
            if let Some(lock) = locks.get(art_nr) {
                return lock.clone();
            }
        }

        // Double-check after acquiring the write lock
        let mut locks = self.record_locks.write().await;
        locks
            .entry(art_nr.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn lock_key(&self, art_nr: &ArtNr) -> OwnedMutexGuard<()> {
        self.get_or_create_record_lock(art_nr).await.lock_owned().await
    }

    /// Drop the key's mutex once no task holds or waits on it.
    ///
    /// Call only after the caller's own guard is gone. New handles are only
    /// handed out under the map lock, so a count of one cannot grow while
    /// we hold it.
    async fn release_record_lock(&self, art_nr: &ArtNr) {
        let mut locks = self.record_locks.write().await;
        if locks
            .get(art_nr)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(art_nr);
        }
    }

    #[cfg(test)]
    async fn record_lock_count(&self) -> usize {
        self.record_locks.read().await.len()
    }

    /// Read a record without taking its mutex.
    pub async fn get(&self, art_nr: &ArtNr) -> Result<ProductRecord, ReviewError> {
        self.repository
            .get(art_nr)
            .await?
            .ok_or_else(|| ReviewError::not_found(art_nr))
    }

    /// Read one record under its mutex and run `check` on it. Nothing is written.
    pub async fn inspect<T, F>(&self, art_nr: &ArtNr, check: F) -> Result<T, ReviewError>
    where
        F: FnOnce(&ProductRecord) -> Result<T, ReviewError>,
    {
        let result = {
            let _guard = self.lock_key(art_nr).await;
            self.get(art_nr).await.and_then(|current| check(&current))
        };
        self.release_record_lock(art_nr).await;
        result
    }

    /// Read, transform and write back one record while holding its mutex.
    ///
    /// If `change` fails nothing is written.
    pub async fn update<F>(&self, art_nr: &ArtNr, change: F) -> Result<ProductRecord, ReviewError>
    where
        F: FnOnce(ProductRecord) -> Result<ProductRecord, ReviewError> + Send + 'static,
    {
        Ok(self.replace(art_nr, change).await?.current)
    }

    /// Like `update`, also returning the record as it was before.
    pub async fn replace<F>(&self, art_nr: &ArtNr, change: F) -> Result<Modified, ReviewError>
    where
        F: FnOnce(ProductRecord) -> Result<ProductRecord, ReviewError> + Send + 'static,
    {
        let result = {
            let _guard = self.lock_key(art_nr).await;
            self.repository.modify(art_nr, Box::new(change)).await
        };
        self.release_record_lock(art_nr).await;
        result
    }

    /// Merge a batch of extracted items into the store in one atomic write.
    ///
    /// Duplicate article numbers collapse to their last occurrence. Key
    /// mutexes are taken in ascending key order.
    pub async fn ingest(
        &self,
        items: Vec<SourceItem>,
        actor: &str,
        now: DateTime<Utc>,
        options: IngestOptions,
    ) -> Result<IngestSummary, ReviewError> {
        let items = dedupe_last_wins(items);
        let keys: Vec<ArtNr> = items.iter().map(|item| item.art_nr.clone()).collect();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.lock_key(key).await);
        }

        let actor = actor.to_string();
        let merge: MergeFn =
            Box::new(move |existing: Option<ProductRecord>, item: SourceItem| {
                merge_item(existing, item, &actor, now, options)
            });
        let result = self.repository.merge_batch(items, merge).await;

        drop(guards);
        for key in &keys {
            self.release_record_lock(key).await;
        }

        let summary = result?;
        debug!("Ingested {} records under {} key locks", summary.total(), keys.len());
        Ok(summary)
    }

    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<ProductRecord>, ReviewError> {
        Ok(self.repository.list(filter).await?)
    }

    /// Approved records as export rows, ordered by article number.
    pub async fn select_approved(&self) -> Result<Vec<ExportRow>, ReviewError> {
        let approved = self
            .repository
            .list(&RecordFilter::with_status(ReviewStatus::Approved))
            .await?;
        Ok(select_approved(&approved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRepository;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn item(art_nr: &str, name: &str) -> SourceItem {
        SourceItem {
            art_nr: ArtNr::from(art_nr),
            name: name.to_string(),
            source_description: format!("Beschreibung {}", name),
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = RecordStore::in_memory();
        let err = store.get(&ArtNr::from("6381")).await.unwrap_err();
        assert_eq!(err, ReviewError::not_found(&ArtNr::from("6381")));
    }

    #[tokio::test]
    async fn test_ingest_counts_created_and_updated() {
        let store = RecordStore::in_memory();
        let first = store
            .ingest(
                vec![item("1000", "a"), item("2000", "b")],
                "uploader",
                t0(),
                IngestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(first, IngestSummary { created: 2, updated: 0 });

        let second = store
            .ingest(
                vec![item("2000", "b2"), item("3000", "c"), item("3000", "c2")],
                "uploader",
                t0(),
                IngestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(second, IngestSummary { created: 1, updated: 1 });

        let c = store.get(&ArtNr::from("3000")).await.unwrap();
        assert_eq!(c.name, "c2");
        assert_eq!(c.updated_by, "uploader");
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let store = RecordStore::in_memory();
        store
            .ingest(vec![item("1000", "a")], "u", t0(), IngestOptions::default())
            .await
            .unwrap();

        let err = store
            .update(&ArtNr::from("1000"), |_| Err(ReviewError::conflict("bob")))
            .await
            .unwrap_err();
        assert_eq!(err, ReviewError::conflict("bob"));
        assert_eq!(store.get(&ArtNr::from("1000")).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_concurrent_updates_on_one_key_are_serialized() {
        let store = Arc::new(RecordStore::in_memory());
        store
            .ingest(vec![item("1000", "")], "u", t0(), IngestOptions::default())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&ArtNr::from("1000"), move |mut record| {
                        record.prompt_additions.push_str(&format!("{};", i));
                        Ok(record)
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get(&ArtNr::from("1000")).await.unwrap();
        assert_eq!(record.prompt_additions.matches(';').count(), 20);
        assert_eq!(store.record_lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_key_mutexes_do_not_outlive_their_callers() {
        let store = RecordStore::in_memory();
        store
            .ingest(vec![item("1000", "a")], "u", t0(), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(store.record_lock_count().await, 0);

        for i in 0..1000 {
            let art_nr = ArtNr::from(format!("unbekannt-{}", i));
            let err = store.update(&art_nr, Ok).await.unwrap_err();
            assert_eq!(err, ReviewError::not_found(&art_nr));
        }
        assert!(store
            .inspect(&ArtNr::from("unbekannt"), |_| Ok(()))
            .await
            .is_err());
        store.update(&ArtNr::from("1000"), Ok).await.unwrap();

        assert_eq!(store.record_lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_waiting_caller_keeps_key_mutex_alive() {
        let store = Arc::new(RecordStore::in_memory());
        store
            .ingest(vec![item("1000", "a")], "u", t0(), IngestOptions::default())
            .await
            .unwrap();

        let first = store.lock_key(&ArtNr::from("1000")).await;
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(&ArtNr::from("1000"), |mut record| {
                        record.name = "b".to_string();
                        Ok(record)
                    })
                    .await
            })
        };
        while Arc::strong_count(&store.get_or_create_record_lock(&ArtNr::from("1000")).await) < 4 {
            tokio::task::yield_now().await;
        }

        // The holder leaves while the update is still queued on the same mutex.
        drop(first);
        store.release_record_lock(&ArtNr::from("1000")).await;
        assert_eq!(store.record_lock_count().await, 1);

        assert_eq!(waiter.await.unwrap().unwrap().name, "b");
        assert_eq!(store.record_lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_import_from_second_store_keeps_editor_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proofdesk.db");
        let server = RecordStore::new(Arc::new(SqliteRepository::new(&path).unwrap()));
        let cli = RecordStore::new(Arc::new(SqliteRepository::new(&path).unwrap()));

        server
            .ingest(vec![item("6381", "Farbenfreude")], "u", t0(), IngestOptions::default())
            .await
            .unwrap();
        server
            .update(&ArtNr::from("6381"), |mut record| {
                record.final_description = "Vom Lektorat".to_string();
                record.locked_by = "alice".to_string();
                record.locked_at = Some(t0());
                Ok(record)
            })
            .await
            .unwrap();

        let summary = cli
            .ingest(
                vec![item("6381", "Farbenfreude XL")],
                "cli@local",
                t0() + Duration::minutes(1),
                IngestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(summary, IngestSummary { created: 0, updated: 1 });

        let record = server.get(&ArtNr::from("6381")).await.unwrap();
        assert_eq!(record.name, "Farbenfreude XL");
        assert_eq!(record.final_description, "Vom Lektorat");
        assert_eq!(record.locked_by, "alice");
    }

    #[tokio::test]
    async fn test_select_approved_reads_only_approved() {
        let store = RecordStore::in_memory();
        store
            .ingest(
                vec![item("2000", "b"), item("1000", "a")],
                "u",
                t0(),
                IngestOptions::default(),
            )
            .await
            .unwrap();
        store
            .update(&ArtNr::from("2000"), |mut record| {
                record.review_status = ReviewStatus::Approved;
                record.updated_at = t0() + Duration::minutes(1);
                Ok(record)
            })
            .await
            .unwrap();

        let rows = store.select_approved().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].art_nr, "2000");
    }
}
