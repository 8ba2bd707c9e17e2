//! CSV export of record listings.

use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("No data to export.")]
    NoData,

    #[error("CSV write failed: {0}")]
    Write(String),
}

/// Output column: header label and the row key it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub label: String,
    pub key: String,
}

impl Column {
    pub fn new(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
        }
    }
}

fn cell(row: &Value, key: &str) -> String {
    match row.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render rows as CSV. Cells containing a comma, quote or newline are
/// quoted; lines end in `\n` with none after the last row.
pub fn export_csv(columns: &[Column], rows: &[Value]) -> Result<String, ExportError> {
    if rows.is_empty() {
        return Err(ExportError::NoData);
    }
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let write_err = |e: csv::Error| ExportError::Write(e.to_string());
    writer
        .write_record(columns.iter().map(|c| c.label.as_str()))
        .map_err(write_err)?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| cell(row, &c.key)))
            .map_err(write_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Write(e.to_string()))?;
    let mut text = String::from_utf8(bytes).map_err(|e| ExportError::Write(e.to_string()))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Export records by field name.
pub fn export_records(columns: &[Column], records: &[Record]) -> Result<String, ExportError> {
    let rows: Vec<Value> = records
        .iter()
        .map(|r| serde_json::to_value(r.fields()).unwrap_or(Value::Null))
        .collect();
    export_csv(columns, &rows)
}
