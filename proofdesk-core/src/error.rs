//! Error taxonomy shared by every review operation.

use thiserror::Error;

use crate::record::ArtNr;

/// Result type for review operations.
pub type ReviewResult<T> = Result<T, ReviewError>;

/// Errors surfaced to the caller of a review operation.
///
/// Each variant maps onto a distinct user-visible failure; none of them is
/// retried or swallowed inside the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    /// No record exists for the article number.
    #[error("product {art_nr} not found")]
    NotFound { art_nr: ArtNr },

    /// Another identity holds the editorial lock.
    #[error("locked by {held_by}")]
    Conflict { held_by: String },

    /// The source document does not follow the expected structure.
    #[error("could not parse document: {0}")]
    Parse(String),

    /// Malformed input from the caller.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The text-generation provider failed.
    #[error("text generation failed: {0}")]
    Upstream(String),

    /// Reading or writing the record store failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Serializing export rows failed.
    #[error("export encoding failed: {0}")]
    Encoding(String),
}

impl ReviewError {
    pub fn not_found(art_nr: &ArtNr) -> Self {
        Self::NotFound {
            art_nr: art_nr.clone(),
        }
    }

    pub fn conflict(held_by: impl Into<String>) -> Self {
        Self::Conflict {
            held_by: held_by.into(),
        }
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Parse(_) => "parse_error",
            Self::Validation(_) => "validation_error",
            Self::Upstream(_) => "upstream_error",
            Self::Storage(_) => "storage_error",
            Self::Encoding(_) => "encoding_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_holder() {
        let err = ReviewError::conflict("alice");
        assert_eq!(err.to_string(), "locked by alice");
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_not_found_message_names_article() {
        let err = ReviewError::not_found(&ArtNr::from("6381"));
        assert_eq!(err.to_string(), "product 6381 not found");
    }
}
