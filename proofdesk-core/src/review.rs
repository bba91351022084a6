//! Review state machine and editorial lock rules.
//!
//! Every mutation of a record goes through [`apply`], a pure function
//! `(record, action) -> record` that checks the lock guard first and only
//! then touches fields. A failed guard therefore never leaves a partially
//! modified record behind.
//!
//! | From              | Action       | To         | Guard                    |
//! |-------------------|--------------|------------|--------------------------|
//! | pending           | AcquireLock  | in_review  | lock available or owned  |
//! | in_review         | AcquireLock  | in_review  | lock available or owned  |
//! | approved/rejected | AcquireLock  | unchanged  | lock available or owned  |
//! | any               | Approve      | approved   | ownership                |
//! | any               | Reject       | rejected   | ownership                |
//! | any               | Save         | unchanged  | ownership                |
//! | any               | RecordGeneration | unchanged | ownership             |
//!
//! Lock expiry is evaluated lazily, at the moment an action is applied. By
//! default only acquisition honours expiry; the ownership guard blocks on any
//! recorded holder other than the actor until that holder's lock is taken
//! over through a fresh acquisition. [`LockPolicy::guard_checks_expiry`]
//! makes the ownership guard honour expiry as well.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::ReviewError;
use crate::quality::QualityReport;
use crate::record::{ProductRecord, ReviewStatus};

pub const DEFAULT_LOCK_TTL_MINUTES: i64 = 30;

/// How editorial locks are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Age after which an unrenewed lock may be taken over.
    pub ttl: Duration,
    /// Let the ownership guard of mutating actions ignore expired locks.
    pub guard_checks_expiry: bool,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(DEFAULT_LOCK_TTL_MINUTES),
            guard_checks_expiry: false,
        }
    }
}

impl LockPolicy {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    /// Fails with `Conflict` unless `actor` may claim or renew the lock.
    pub fn check_acquire(
        &self,
        record: &ProductRecord,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ReviewError> {
        match record.lock_holder() {
            Some(holder) if holder != actor && !record.lock_expired(now, self.ttl) => {
                Err(ReviewError::conflict(holder))
            }
            _ => Ok(()),
        }
    }

    /// Fails with `Conflict` if someone other than `actor` holds the lock.
    pub fn require_ownership(
        &self,
        record: &ProductRecord,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ReviewError> {
        match record.lock_holder() {
            Some(holder) if holder != actor => {
                if self.guard_checks_expiry && record.lock_expired(now, self.ttl) {
                    Ok(())
                } else {
                    Err(ReviewError::conflict(holder))
                }
            }
            _ => Ok(()),
        }
    }
}

/// A user action against one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    /// Open the record for editing, claiming or renewing its lock.
    AcquireLock,
    /// Store the editor's prompt additions and final wording.
    Save {
        prompt_additions: String,
        final_description: String,
    },
    /// Store a generator result together with its quality verdict.
    RecordGeneration { text: String, quality: QualityReport },
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn log_summary(&self) -> &'static str {
        match self {
            Self::AcquireLock => "acquire_lock",
            Self::Save { .. } => "save",
            Self::RecordGeneration { .. } => "record_generation",
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Apply `action` by `actor` to `record` at time `now`.
///
/// Audit fields follow content and status changes. Renewing a lock on a
/// record that is already in review only moves `locked_at`.
pub fn apply(
    mut record: ProductRecord,
    action: ReviewAction,
    actor: &str,
    now: DateTime<Utc>,
    policy: &LockPolicy,
) -> Result<ProductRecord, ReviewError> {
    debug!(
        "Applying {} to {} by {} in status {}",
        action.log_summary(),
        record.art_nr,
        actor,
        record.review_status
    );

    match action {
        ReviewAction::AcquireLock => {
            policy.check_acquire(&record, actor, now)?;
            record.locked_by = actor.to_string();
            record.locked_at = Some(now);
            if record.review_status == ReviewStatus::Pending {
                record.review_status = ReviewStatus::InReview;
                record.touch(actor, now);
            }
        }
        ReviewAction::Save {
            prompt_additions,
            final_description,
        } => {
            policy.require_ownership(&record, actor, now)?;
            record.prompt_additions = prompt_additions;
            record.final_description = final_description;
            record.touch(actor, now);
        }
        ReviewAction::RecordGeneration { text, quality } => {
            policy.require_ownership(&record, actor, now)?;
            record.generated_description = text;
            record.qa_notes = if quality.passed {
                String::new()
            } else {
                quality.reason
            };
            record.touch(actor, now);
        }
        ReviewAction::Approve => {
            policy.require_ownership(&record, actor, now)?;
            record.review_status = ReviewStatus::Approved;
            record.touch(actor, now);
        }
        ReviewAction::Reject => {
            policy.require_ownership(&record, actor, now)?;
            record.review_status = ReviewStatus::Rejected;
            record.touch(actor, now);
        }
    }

    Ok(record)
}
