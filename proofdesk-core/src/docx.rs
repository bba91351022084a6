//! Reading paragraphs out of a DOCX container.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::{Cursor, Read};

use crate::error::ReviewError;
use crate::extract::parse_paragraphs;
use crate::ingest::SourceItem;

const DOCUMENT_PART: &str = "word/document.xml";

/// Whether an uploaded file name looks like a DOCX document.
pub fn is_docx_file_name(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".docx")
}

/// Extract the plain text of every paragraph in the main document part.
pub fn read_paragraphs(bytes: &[u8]) -> Result<Vec<String>, ReviewError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ReviewError::Parse(format!("not a DOCX container: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ReviewError::Parse(format!("missing {}: {}", DOCUMENT_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ReviewError::Parse(format!("unreadable {}: {}", DOCUMENT_PART, e)))?;

    paragraphs_from_xml(&xml)
}

/// Extract product sections from DOCX bytes.
pub fn extract_items(bytes: &[u8]) -> Result<Vec<SourceItem>, ReviewError> {
    let paragraphs = read_paragraphs(bytes)?;
    parse_paragraphs(paragraphs)
}

/// Walk WordprocessingML and collect the text of each `w:p` element.
///
/// A paragraph nested in another one (text box content) is emitted on its
/// own when it closes; the enclosing paragraph keeps its text on both sides
/// of it. `mc:Fallback` repeats the preferred rendering and is skipped.
pub(crate) fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>, ReviewError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut fallback_depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            ReviewError::Parse(format!(
                "malformed document XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(e) if e.name().as_ref() == b"mc:Fallback" => fallback_depth += 1,
            Event::End(e) if e.name().as_ref() == b"mc:Fallback" => {
                fallback_depth = fallback_depth.saturating_sub(1)
            }
            Event::Eof => break,
            _ if fallback_depth > 0 => {}
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => {
                    if let Some(paragraph) = open.last_mut() {
                        paragraph.push('\t');
                    }
                }
                b"w:br" | b"w:cr" => {
                    if let Some(paragraph) = open.last_mut() {
                        paragraph.push(' ');
                    }
                }
                _ => {}
            },
            Event::Text(text) if in_text => {
                let text = text
                    .unescape()
                    .map_err(|e| ReviewError::Parse(format!("bad text run: {}", e)))?;
                if let Some(paragraph) = open.last_mut() {
                    paragraph.push_str(&text);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    if let Some(paragraph) = open.pop() {
                        paragraphs.push(paragraph);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    Ok(paragraphs)
}
