//! Splitting document paragraphs into product sections.
//!
//! A section starts with a header paragraph such as
//! `Art.-Nr. 6381 – Farbenfreude` and runs until the next header. Text
//! before the first header is ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ReviewError;
use crate::ingest::SourceItem;
use crate::record::ArtNr;

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*Art\.-Nr\.\s*([0-9]{4,6})\s*[-–—]\s*(.+?)\s*$")
        .expect("header pattern must compile")
});

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));

/// Parse a header paragraph into its article number and product name.
pub fn parse_header(line: &str) -> Option<(ArtNr, String)> {
    let caps = HEADER.captures(line)?;
    Some((ArtNr::from(&caps[1]), caps[2].trim().to_string()))
}

struct Section {
    art_nr: ArtNr,
    name: String,
    lines: Vec<String>,
}

impl Section {
    fn finish(self) -> SourceItem {
        let joined = self.lines.join(" ");
        SourceItem {
            art_nr: self.art_nr,
            name: self.name,
            source_description: WHITESPACE_RUN.replace_all(joined.trim(), " ").into_owned(),
        }
    }
}

/// Group paragraphs into one [`SourceItem`] per header, in document order.
///
/// Fails with [`ReviewError::Parse`] if no header is found at all.
pub fn parse_paragraphs<I, S>(paragraphs: I) -> Result<Vec<SourceItem>, ReviewError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut items = Vec::new();
    let mut current: Option<Section> = None;

    for paragraph in paragraphs {
        let line = paragraph.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        if let Some((art_nr, name)) = parse_header(line) {
            if let Some(section) = current.take() {
                items.push(section.finish());
            }
            current = Some(Section {
                art_nr,
                name,
                lines: Vec::new(),
            });
        } else if let Some(section) = current.as_mut() {
            section.lines.push(line.to_string());
        }
    }

    if let Some(section) = current {
        items.push(section.finish());
    }

    if items.is_empty() {
        return Err(ReviewError::Parse(
            "no 'Art.-Nr. <number> – <name>' header found".to_string(),
        ));
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_variants() {
        let (art_nr, name) = parse_header("Art.-Nr. 6381 – Farbenfreude").unwrap();
        assert_eq!(art_nr, ArtNr::from("6381"));
        assert_eq!(name, "Farbenfreude");

        let (art_nr, name) = parse_header("  art.-nr.123456-Pinselset Deluxe  ").unwrap();
        assert_eq!(art_nr, ArtNr::from("123456"));
        assert_eq!(name, "Pinselset Deluxe");

        assert!(parse_header("Art.-Nr. 6381 — Farbenfreude").is_some());
    }

    #[test]
    fn test_header_rejects_wrong_digit_counts() {
        assert!(parse_header("Art.-Nr. 123 – Zu kurz").is_none());
        assert!(parse_header("Art.-Nr. 1234567 – Zu lang").is_none());
        assert!(parse_header("Art.-Nr. 6381 Farbenfreude").is_none());
    }

    #[test]
    fn test_sections_collect_following_paragraphs() {
        let paragraphs = [
            "Katalog 2026",
            "Art.-Nr. 6381 – Farbenfreude",
            "Zwölf  leuchtende",
            "",
            "Farben im Set.",
            "Art.-Nr. 6382 – Pinselwelt",
            "Feine\tPinsel.",
        ];
        let items = parse_paragraphs(paragraphs).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Farbenfreude");
        assert_eq!(
            items[0].source_description,
            "Zwölf leuchtende Farben im Set."
        );
        assert_eq!(items[1].art_nr, ArtNr::from("6382"));
        assert_eq!(items[1].source_description, "Feine Pinsel.");
    }

    #[test]
    fn test_header_without_body_has_empty_description() {
        let items = parse_paragraphs(["Art.-Nr. 1000 – Leer"]).unwrap();
        assert_eq!(items[0].source_description, "");
    }

    #[test]
    fn test_duplicates_are_kept_in_document_order() {
        let items = parse_paragraphs([
            "Art.-Nr. 1000 – Erst",
            "a",
            "Art.-Nr. 1000 – Zweit",
            "b",
        ])
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "Zweit");
    }

    #[test]
    fn test_no_header_is_parse_error() {
        let err = parse_paragraphs(["Nur Fließtext", "ohne Kopfzeile"]).unwrap_err();
        assert!(matches!(err, ReviewError::Parse(_)));
    }
}
