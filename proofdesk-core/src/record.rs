//! Product review records.
//!
//! A `ProductRecord` carries two independent pieces of state: the review
//! status (`pending → in_review → approved/rejected`) and the editorial lock
//! (`locked_by`, `locked_at`). The lock is not a review state; the two only
//! interact through the rules in [`crate::review`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReviewError;

/// Article number, the primary key of a product record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtNr(pub String);

impl ArtNr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtNr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ArtNr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtNr {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a record stands in the review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Freshly ingested, nobody has opened it yet.
    #[default]
    Pending,
    /// Opened by an editor at least once.
    InReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 4] = [
        ReviewStatus::Pending,
        ReviewStatus::InReview,
        ReviewStatus::Approved,
        ReviewStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ReviewError::Validation(format!("unknown review status '{}'", s)))
    }
}

/// Review workflow state for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub art_nr: ArtNr,
    pub name: String,
    /// Text extracted from the source document.
    pub source_description: String,
    /// Editor-supplied text appended to generation prompts.
    pub prompt_additions: String,
    /// Last text produced by the generator.
    pub generated_description: String,
    /// Editor-approved wording; wins over the generated text on export.
    pub final_description: String,
    pub review_status: ReviewStatus,
    /// Reason the last quality check failed, empty when it passed.
    pub qa_notes: String,
    pub locked_by: String,
    pub locked_at: Option<DateTime<Utc>>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// A record with every field at its default, as created on first ingestion.
    pub fn new(art_nr: ArtNr, now: DateTime<Utc>) -> Self {
        Self {
            art_nr,
            name: String::new(),
            source_description: String::new(),
            prompt_additions: String::new(),
            generated_description: String::new(),
            final_description: String::new(),
            review_status: ReviewStatus::Pending,
            qa_notes: String::new(),
            locked_by: String::new(),
            locked_at: None,
            updated_by: String::new(),
            updated_at: now,
        }
    }

    /// Whether the last lock acquisition is older than `ttl`.
    ///
    /// A record that was never locked is not expired.
    pub fn lock_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.locked_at.is_some_and(|at| now - at > ttl)
    }

    /// Whether an identity currently holds a live lock on this record.
    pub fn is_locked(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.locked_by.is_empty() && self.locked_at.is_some_and(|at| now - at <= ttl)
    }

    /// The identity recorded as lock holder, if any.
    pub fn lock_holder(&self) -> Option<&str> {
        if self.locked_by.is_empty() {
            None
        } else {
            Some(&self.locked_by)
        }
    }

    pub fn clear_lock(&mut self) {
        self.locked_by.clear();
        self.locked_at = None;
    }

    pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.updated_by = actor.to_string();
        self.updated_at = now;
    }

    /// Text exported for this record.
    ///
    /// The final description is used whenever it is non-empty, otherwise the
    /// generated one; the chosen text is trimmed. Both empty exports `""`.
    pub fn export_description(&self) -> &str {
        if !self.final_description.is_empty() {
            self.final_description.trim()
        } else {
            self.generated_description.trim()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ReviewStatus::ALL {
            assert_eq!(status.as_str().parse::<ReviewStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_validation_error() {
        let err = "done".parse::<ReviewStatus>().unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ReviewStatus::InReview).unwrap();
        assert_eq!(json, "\"in_review\"");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = ProductRecord::new(ArtNr::from("6381"), t0());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["artNr"], "6381");
        assert_eq!(value["reviewStatus"], "pending");
        assert!(value["lockedAt"].is_null());
    }

    #[test]
    fn test_lock_expiry_is_strictly_after_ttl() {
        let mut record = ProductRecord::new(ArtNr::from("1000"), t0());
        record.locked_by = "alice".to_string();
        record.locked_at = Some(t0());
        let ttl = Duration::minutes(30);

        assert!(!record.lock_expired(t0() + ttl, ttl));
        assert!(record.is_locked(t0() + ttl, ttl));
        assert!(record.lock_expired(t0() + ttl + Duration::seconds(1), ttl));
        assert!(!record.is_locked(t0() + ttl + Duration::seconds(1), ttl));
    }

    #[test]
    fn test_never_locked_record_is_not_expired() {
        let record = ProductRecord::new(ArtNr::from("1000"), t0());
        assert!(!record.lock_expired(t0() + Duration::days(1), Duration::minutes(30)));
        assert!(record.lock_holder().is_none());
    }

    #[test]
    fn test_export_prefers_final_description() {
        let mut record = ProductRecord::new(ArtNr::from("1000"), t0());
        record.final_description = " X ".to_string();
        record.generated_description = "Y".to_string();
        assert_eq!(record.export_description(), "X");

        record.final_description.clear();
        record.generated_description = "  Y\n".to_string();
        assert_eq!(record.export_description(), "Y");
    }

    #[test]
    fn test_export_of_empty_descriptions_is_empty() {
        let record = ProductRecord::new(ArtNr::from("1000"), t0());
        assert_eq!(record.export_description(), "");
    }

    #[test]
    fn test_whitespace_final_description_still_wins() {
        let mut record = ProductRecord::new(ArtNr::from("1000"), t0());
        record.final_description = "   ".to_string();
        record.generated_description = "Y".to_string();
        assert_eq!(record.export_description(), "");
    }
}
