//! Selecting approved records and encoding them for the shop import.

use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::str::FromStr;

use crate::error::ReviewError;
use crate::record::{ProductRecord, ReviewStatus};

/// Column header shared by every export format.
pub const EXPORT_HEADER: [&str; 3] = ["art_nr", "name", "beschreibung"];

/// One exported product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub art_nr: String,
    pub name: String,
    pub beschreibung: String,
}

impl From<&ProductRecord> for ExportRow {
    fn from(record: &ProductRecord) -> Self {
        Self {
            art_nr: record.art_nr.to_string(),
            name: record.name.clone(),
            beschreibung: record.export_description().to_string(),
        }
    }
}

/// Keep approved records only, ordered by article number.
pub fn select_approved<'a>(records: impl IntoIterator<Item = &'a ProductRecord>) -> Vec<ExportRow> {
    let mut approved: Vec<&ProductRecord> = records
        .into_iter()
        .filter(|record| record.review_status == ReviewStatus::Approved)
        .collect();
    approved.sort_by(|a, b| a.art_nr.cmp(&b.art_nr));
    approved.into_iter().map(ExportRow::from).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Csv => "shop_export.csv",
            Self::Xlsx => "shop_export.xlsx",
        }
    }

    pub fn encode(&self, rows: &[ExportRow]) -> Result<Vec<u8>, ReviewError> {
        match self {
            Self::Csv => encode_csv(rows),
            Self::Xlsx => encode_xlsx(rows),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(ReviewError::Validation(format!(
                "unknown export format '{}'",
                other
            ))),
        }
    }
}

/// UTF-8 CSV with a header row and CRLF line endings.
pub fn encode_csv(rows: &[ExportRow]) -> Result<Vec<u8>, ReviewError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer
        .write_record(EXPORT_HEADER)
        .map_err(|e| ReviewError::Encoding(e.to_string()))?;
    for row in rows {
        writer
            .write_record([row.art_nr.as_str(), row.name.as_str(), row.beschreibung.as_str()])
            .map_err(|e| ReviewError::Encoding(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ReviewError::Encoding(e.to_string()))
}

/// Single-sheet workbook named `export` with a header row.
pub fn encode_xlsx(rows: &[ExportRow]) -> Result<Vec<u8>, ReviewError> {
    let encoding = |e: rust_xlsxwriter::XlsxError| ReviewError::Encoding(e.to_string());

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("export").map_err(encoding)?;

    for (col, title) in (0u16..).zip(EXPORT_HEADER) {
        worksheet.write_string(0, col, title).map_err(encoding)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let line = u32::try_from(index + 1)
            .map_err(|_| ReviewError::Encoding("too many rows for a worksheet".to_string()))?;
        worksheet
            .write_string(line, 0, row.art_nr.as_str())
            .map_err(encoding)?;
        worksheet
            .write_string(line, 1, row.name.as_str())
            .map_err(encoding)?;
        worksheet
            .write_string(line, 2, row.beschreibung.as_str())
            .map_err(encoding)?;
    }

    workbook.save_to_buffer().map_err(encoding)
}
