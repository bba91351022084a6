//! Text quality linting for generated descriptions.
//!
//! The check is a soft gate: its result is stored as `qa_notes` on the
//! record but never blocks approval.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

pub const MIN_LENGTH: usize = 80;
pub const MAX_LENGTH: usize = 500;

/// Phrases implying claims nobody can verify.
pub const FORBIDDEN_PATTERNS: &[&str] = &[r"\bbestes\b", r"\bgarantiert\b", r"100\s*%"];

static FORBIDDEN: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FORBIDDEN_PATTERNS
        .iter()
        .map(|pattern| {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("deny-list pattern must compile");
            (*pattern, regex)
        })
        .collect()
});

/// Outcome of a quality check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub passed: bool,
    /// Empty when the check passed.
    pub reason: String,
}

impl QualityReport {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: String::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// Lint `text` for length and forbidden phrases.
///
/// Length is counted in characters after trimming. The first failing rule
/// wins: short, then long, then the deny-list in order.
pub fn check(text: &str) -> QualityReport {
    let trimmed = text.trim();
    let length = trimmed.chars().count();

    if length < MIN_LENGTH {
        return QualityReport::fail("too short");
    }
    if length > MAX_LENGTH {
        return QualityReport::fail("too long");
    }

    FORBIDDEN
        .iter()
        .find(|(_, regex)| regex.is_match(trimmed))
        .map(|(pattern, _)| QualityReport::fail(format!("forbidden phrase: {}", pattern)))
        .unwrap_or_else(QualityReport::pass)
}
