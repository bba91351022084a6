//! Durable `RecordRepository` backed by a single SQLite file.
//!
//! One row per article number in the `products` table; timestamps are
//! stored as Unix milliseconds.
//!
//! `modify` and `merge_batch` run in `BEGIN IMMEDIATE` transactions, which
//! take the file's write lock before the first read. A second process using
//! the same file (the `proofdesk` CLI next to the server) therefore cannot
//! slip a write between another writer's read and write.
//!
//! `schema_version` holds a single row. Opening a file written by a newer
//! build fails; an older file is brought forward step by step in
//! `run_migrations()`.


use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proofdesk_core::{ArtNr, IngestSummary, ProductRecord, ReviewError, ReviewStatus, SourceItem};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::{ChangeFn, MergeFn, Modified, RecordFilter, RecordRepository, RepositoryError};

/// Bump together with a new step in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

const SELECT_COLUMNS: &str = "art_nr, name, source_description, prompt_additions,
    generated_description, final_description, review_status, qa_notes,
    locked_by, locked_at, updated_by, updated_at";

/// Every query runs on the blocking pool behind one shared connection.
pub struct SqliteRepository {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open or create the database at `path`.
    ///
    /// Creates the database file and schema if they don't exist, and runs
    /// pending migrations on an older schema. The connection uses
    /// `journal_mode = WAL` and `busy_timeout = 5000ms`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite silently keeps DELETE mode on filesystems without shared memory.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "SQLite returned '{}' instead of 'wal' for {}",
                    journal_mode, path_str
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if the table is empty, i.e. a fresh database
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Throwaway database, used by tests.
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Apply every step after `from_version`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS products (
                    art_nr TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL DEFAULT '',
                    source_description TEXT NOT NULL DEFAULT '',
                    prompt_additions TEXT NOT NULL DEFAULT '',
                    generated_description TEXT NOT NULL DEFAULT '',
                    final_description TEXT NOT NULL DEFAULT '',
                    review_status TEXT NOT NULL DEFAULT 'pending' CHECK(review_status IN (
                        'pending', 'in_review', 'approved', 'rejected'
                    )),
                    qa_notes TEXT NOT NULL DEFAULT '',
                    locked_by TEXT NOT NULL DEFAULT '',
                    -- milliseconds since the Unix epoch
                    locked_at INTEGER,
                    updated_by TEXT NOT NULL DEFAULT '',
                    updated_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_products_status
                    ON products(review_status, art_nr);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        debug!(
            "Migrated products schema from v{} to v{}",
            from_version, CURRENT_SCHEMA_VERSION
        );
        Ok(())
    }
}

fn lock_conn<'a>(
    conn: &'a Mutex<Connection>,
    operation: &'static str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

/// Raw column values, converted into a record outside rusqlite's row closure
/// so that decoding failures surface as corruption rather than SQL errors.
struct RawRow {
    art_nr: String,
    name: String,
    source_description: String,
    prompt_additions: String,
    generated_description: String,
    final_description: String,
    review_status: String,
    qa_notes: String,
    locked_by: String,
    locked_at: Option<i64>,
    updated_by: String,
    updated_at: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            art_nr: row.get(0)?,
            name: row.get(1)?,
            source_description: row.get(2)?,
            prompt_additions: row.get(3)?,
            generated_description: row.get(4)?,
            final_description: row.get(5)?,
            review_status: row.get(6)?,
            qa_notes: row.get(7)?,
            locked_by: row.get(8)?,
            locked_at: row.get(9)?,
            updated_by: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<ProductRecord, RepositoryError> {
        let review_status: ReviewStatus = self
            .review_status
            .parse()
            .map_err(|_| RepositoryError::corruption(format!("review_status of {}", self.art_nr)))?;
        let locked_at = match self.locked_at {
            Some(millis) => Some(millis_to_datetime(millis, "locked_at")?),
            None => None,
        };

        Ok(ProductRecord {
            art_nr: ArtNr(self.art_nr),
            name: self.name,
            source_description: self.source_description,
            prompt_additions: self.prompt_additions,
            generated_description: self.generated_description,
            final_description: self.final_description,
            review_status,
            qa_notes: self.qa_notes,
            locked_by: self.locked_by,
            locked_at,
            updated_by: self.updated_by,
            updated_at: millis_to_datetime(self.updated_at, "updated_at")?,
        })
    }
}

fn millis_to_datetime(millis: i64, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| RepositoryError::corruption(format!("{} timestamp {}", column, millis)))
}

fn read_record(conn: &Connection, art_nr: &str) -> Result<Option<ProductRecord>, RepositoryError> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM products WHERE art_nr = ?1", SELECT_COLUMNS),
            params![art_nr],
            RawRow::from_row,
        )
        .optional()
        .map_err(|e| RepositoryError::storage("get", e.to_string()))?;

    raw.map(RawRow::into_record).transpose()
}

fn write_record(conn: &Connection, record: &ProductRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO products (art_nr, name, source_description, prompt_additions,
                               generated_description, final_description, review_status,
                               qa_notes, locked_by, locked_at, updated_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(art_nr) DO UPDATE SET
             name = excluded.name,
             source_description = excluded.source_description,
             prompt_additions = excluded.prompt_additions,
             generated_description = excluded.generated_description,
             final_description = excluded.final_description,
             review_status = excluded.review_status,
             qa_notes = excluded.qa_notes,
             locked_by = excluded.locked_by,
             locked_at = excluded.locked_at,
             updated_by = excluded.updated_by,
             updated_at = excluded.updated_at",
        params![
            record.art_nr.as_str(),
            record.name,
            record.source_description,
            record.prompt_additions,
            record.generated_description,
            record.final_description,
            record.review_status.as_str(),
            record.qa_notes,
            record.locked_by,
            record.locked_at.map(|at| at.timestamp_millis()),
            record.updated_by,
            record.updated_at.timestamp_millis(),
        ],
    )
}

#[async_trait]
impl RecordRepository for SqliteRepository {
    async fn get(&self, art_nr: &ArtNr) -> Result<Option<ProductRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let key = art_nr.as_str().to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "get")?;
            read_record(&conn, &key)
        })
        .await
        .map_err(|e| RepositoryError::storage("get", e.to_string()))?
    }

    async fn upsert(&self, record: ProductRecord) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "upsert")?;
            write_record(&conn, &record)
                .map_err(|e| RepositoryError::storage("upsert", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("upsert", e.to_string()))?
    }

    async fn modify(&self, art_nr: &ArtNr, change: ChangeFn) -> Result<Modified, ReviewError> {
        let conn = self.conn.clone();
        let key = art_nr.clone();

        let modified = tokio::task::spawn_blocking(move || -> Result<Modified, ReviewError> {
            let mut conn = lock_conn(&conn, "modify")?;

            // Dropping the transaction without commit leaves the row as it was.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("begin modify", e.to_string()))?;
            let previous =
                read_record(&tx, key.as_str())?.ok_or_else(|| ReviewError::not_found(&key))?;
            let current = change(previous.clone())?;
            write_record(&tx, &current)
                .map_err(|e| RepositoryError::storage("modify", e.to_string()))?;
            tx.commit()
                .map_err(|e| RepositoryError::storage("commit modify", e.to_string()))?;

            Ok(Modified { previous, current })
        })
        .await
        .map_err(|e| RepositoryError::storage("modify", e.to_string()))??;

        Ok(modified)
    }

    async fn merge_batch(
        &self,
        items: Vec<SourceItem>,
        merge: MergeFn,
    ) -> Result<IngestSummary, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = lock_conn(&conn, "merge_batch")?;

            // Dropping the transaction without commit rolls back every row.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("begin merge_batch", e.to_string()))?;
            let mut summary = IngestSummary::default();
            for item in items {
                let existing = read_record(&tx, item.art_nr.as_str())?;
                if existing.is_some() {
                    summary.updated += 1;
                } else {
                    summary.created += 1;
                }
                let record = merge(existing, item);
                write_record(&tx, &record).map_err(|e| {
                    RepositoryError::storage("merge_batch", format!("{}: {}", record.art_nr, e))
                })?;
            }
            tx.commit()
                .map_err(|e| RepositoryError::storage("commit merge_batch", e.to_string()))?;
            Ok(summary)
        })
        .await
        .map_err(|e| RepositoryError::storage("merge_batch", e.to_string()))?
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<ProductRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "list")?;

            let raws: Vec<RawRow> = match filter.status {
                Some(status) => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "SELECT {} FROM products WHERE review_status = ?1 ORDER BY art_nr",
                            SELECT_COLUMNS
                        ))
                        .map_err(|e| RepositoryError::storage("list", e.to_string()))?;
                    let rows = stmt
                        .query_map(params![status.as_str()], RawRow::from_row)
                        .map_err(|e| RepositoryError::storage("list", e.to_string()))?;
                    rows.collect::<rusqlite::Result<_>>()
                        .map_err(|e| RepositoryError::storage("list", e.to_string()))?
                }
                None => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "SELECT {} FROM products ORDER BY art_nr",
                            SELECT_COLUMNS
                        ))
                        .map_err(|e| RepositoryError::storage("list", e.to_string()))?;
                    let rows = stmt
                        .query_map([], RawRow::from_row)
                        .map_err(|e| RepositoryError::storage("list", e.to_string()))?;
                    rows.collect::<rusqlite::Result<_>>()
                        .map_err(|e| RepositoryError::storage("list", e.to_string()))?
                }
            };

            // SQLite's LOWER() only folds ASCII, so the text filter runs here.
            let mut records = Vec::with_capacity(raws.len());
            for raw in raws {
                let record = raw.into_record()?;
                if filter.matches_text(&record) {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
        .map_err(|e| RepositoryError::storage("list", e.to_string()))?
    }
}
