//! Review workflow orchestration.
//!
//! `ReviewService` ties the pure transition function to the record store,
//! the clock and the text generator. Each operation is one guarded
//! read-modify-write on a single record, except `generate`, which splits
//! into a guard check, the external call with no store mutex held, and a
//! guarded write-back that re-validates ownership.

use std::sync::Arc;

use proofdesk_core::docx::{extract_items, is_docx_file_name};
use proofdesk_core::quality;
use proofdesk_core::{
    apply, ArtNr, Clock, ExportFormat, ExportRow, GenerationRequest, IngestOptions,
    IngestSummary, LockPolicy, ProductRecord, ReviewAction, ReviewError, SourceItem,
    SystemClock, TextGenerator,
};
use tracing::{error, info, warn};

use crate::repository::{Modified, RecordFilter};
use crate::store::RecordStore;

pub struct ReviewService {
    store: RecordStore,
    generator: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
    policy: LockPolicy,
    ingest_options: IngestOptions,
}

impl ReviewService {
    pub fn new(store: RecordStore, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            clock: Arc::new(SystemClock),
            policy: LockPolicy::default(),
            ingest_options: IngestOptions::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ingest_options(mut self, options: IngestOptions) -> Self {
        self.ingest_options = options;
        self
    }

    /// Apply one action as a guarded read-modify-write.
    async fn transition(
        &self,
        art_nr: &ArtNr,
        actor: &str,
        action: ReviewAction,
    ) -> Result<ProductRecord, ReviewError> {
        let name = action.log_summary();
        let now = self.clock.now();
        let policy = self.policy;
        let editor = actor.to_string();
        let result = self
            .store
            .update(art_nr, move |record| apply(record, action, &editor, now, &policy))
            .await;

        if let Err(ReviewError::Conflict { held_by }) = &result {
            warn!(
                "{} on {} by {} refused: locked by {}",
                name, art_nr, actor, held_by
            );
        }
        result
    }

    /// Open a record for editing, claiming or renewing its lock.
    pub async fn acquire_or_renew_lock(
        &self,
        art_nr: &ArtNr,
        actor: &str,
    ) -> Result<ProductRecord, ReviewError> {
        let now = self.clock.now();
        let policy = self.policy;
        let editor = actor.to_string();
        let result = self
            .store
            .replace(art_nr, move |record| {
                apply(record, ReviewAction::AcquireLock, &editor, now, &policy)
            })
            .await;

        match &result {
            Ok(Modified { previous, current }) => match previous.lock_holder() {
                None => info!(
                    "Lock on {} granted to {} ({})",
                    art_nr, actor, current.review_status
                ),
                Some(holder) if holder == actor => {
                    info!("Lock on {} renewed by {}", art_nr, actor)
                }
                Some(holder) => {
                    info!("Expired lock on {} taken over from {} by {}", art_nr, holder, actor)
                }
            },
            Err(ReviewError::Conflict { held_by }) => {
                warn!("Lock on {} denied to {}: held by {}", art_nr, actor, held_by)
            }
            Err(_) => {}
        }
        result.map(|modified| modified.current)
    }

    pub async fn save(
        &self,
        art_nr: &ArtNr,
        actor: &str,
        prompt_additions: String,
        final_description: String,
    ) -> Result<ProductRecord, ReviewError> {
        let record = self
            .transition(
                art_nr,
                actor,
                ReviewAction::Save {
                    prompt_additions,
                    final_description,
                },
            )
            .await?;
        info!("Saved {} by {}", art_nr, actor);
        Ok(record)
    }

    /// Generate a description and store it with its quality verdict.
    ///
    /// The store mutex is not held while the generator runs. If the actor
    /// lost the lock in the meantime the text is discarded and the call
    /// fails with `Conflict`. Generator failures leave the record untouched.
    pub async fn generate(
        &self,
        art_nr: &ArtNr,
        actor: &str,
    ) -> Result<ProductRecord, ReviewError> {
        let checked_at = self.clock.now();
        let request = self
            .store
            .inspect(art_nr, |record| {
                self.policy.require_ownership(record, actor, checked_at)?;
                Ok(GenerationRequest::for_record(record))
            })
            .await
            .map_err(|e| {
                if let ReviewError::Conflict { held_by } = &e {
                    warn!(
                        "generate on {} by {} refused: locked by {}",
                        art_nr, actor, held_by
                    );
                }
                e
            })?;

        info!("Generating description for {} by {}", art_nr, actor);
        let text = self.generator.generate(&request).await.map_err(|e| {
            error!("Generation for {} failed: {}", art_nr, e);
            e
        })?;

        let report = quality::check(&text);
        if report.passed {
            info!("Generated text for {} passed quality check", art_nr);
        } else {
            warn!(
                "Generated text for {} failed quality check: {}",
                art_nr, report.reason
            );
        }

        let result = self
            .transition(
                art_nr,
                actor,
                ReviewAction::RecordGeneration {
                    text,
                    quality: report,
                },
            )
            .await;
        if matches!(result, Err(ReviewError::Conflict { .. })) {
            warn!(
                "Discarded generated text for {}: {} lost the lock during generation",
                art_nr, actor
            );
        }
        result
    }

    pub async fn approve(&self, art_nr: &ArtNr, actor: &str) -> Result<ProductRecord, ReviewError> {
        let record = self.transition(art_nr, actor, ReviewAction::Approve).await?;
        info!("Approved {} by {}", art_nr, actor);
        Ok(record)
    }

    pub async fn reject(&self, art_nr: &ArtNr, actor: &str) -> Result<ProductRecord, ReviewError> {
        let record = self.transition(art_nr, actor, ReviewAction::Reject).await?;
        info!("Rejected {} by {}", art_nr, actor);
        Ok(record)
    }

    /// Merge extracted items into the store as one atomic unit.
    pub async fn ingest(
        &self,
        items: Vec<SourceItem>,
        actor: &str,
    ) -> Result<IngestSummary, ReviewError> {
        let now = self.clock.now();
        let summary = self
            .store
            .ingest(items, actor, now, self.ingest_options)
            .await?;
        info!(
            "Ingested {} records for {} ({} new, {} updated)",
            summary.total(),
            actor,
            summary.created,
            summary.updated
        );
        Ok(summary)
    }

    /// Validate, extract and ingest an uploaded DOCX document.
    pub async fn ingest_document(
        &self,
        file_name: &str,
        bytes: &[u8],
        actor: &str,
    ) -> Result<IngestSummary, ReviewError> {
        if !is_docx_file_name(file_name) {
            return Err(ReviewError::Validation(format!(
                "expected a .docx file, got '{}'",
                file_name
            )));
        }

        let items = extract_items(bytes).map_err(|e| {
            warn!("Could not extract products from {}: {}", file_name, e);
            e
        })?;
        self.ingest(items, actor).await
    }

    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<ProductRecord>, ReviewError> {
        self.store.list(filter).await
    }

    pub async fn select_approved(&self) -> Result<Vec<ExportRow>, ReviewError> {
        self.store.select_approved().await
    }

    /// Encode every approved record in `format`.
    pub async fn export(&self, format: ExportFormat) -> Result<Vec<u8>, ReviewError> {
        let rows = self.select_approved().await?;
        let bytes = format.encode(&rows)?;
        info!(
            "Exported {} approved records as {} ({} bytes)",
            rows.len(),
            format.file_name(),
            bytes.len()
        );
        Ok(bytes)
    }
}
