//! CSV import.
//!
//! The first non-blank row is the header. Headers match case-insensitively
//! with all whitespace removed, so `Event Date`, `eventDate` and `EVENTDATE`
//! are the same column. Missing required columns abort the whole import.

use std::collections::HashMap;

use csv::{ReaderBuilder, Trim};
use thiserror::Error;

use crate::record::{
    ImageSource, MISSING_VALUE, Record, RecordKind, STOCK_TAGLINE, generated_participant_id,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    #[error("CSV file is missing required header for {kind} ID: '{header}'.")]
    MissingHeader {
        kind: RecordKind,
        header: &'static str,
    },

    #[error("No valid data rows found in the CSV file.")]
    NoRows,

    #[error("Malformed CSV: {0}")]
    Malformed(String),
}

/// A CSV column: normalised header and the record field it fills.
struct Column {
    header: &'static str,
    field: &'static str,
}

const fn col(header: &'static str, field: &'static str) -> Column {
    Column { header, field }
}

const STUDENT_REQUIRED: &[Column] = &[col("name", "name"), col("regno", "regNo"), col("dept", "dept")];
const STUDENT_OPTIONAL: &[Column] = &[
    col("gender", "gender"),
    col("address", "address"),
    col("dob", "dob"),
    col("phone", "phone"),
    col("bloodgroup", "bloodGroup"),
];
const EVENT_REQUIRED: &[Column] = &[
    col("name", "name"),
    col("role", "role"),
    col("eventname", "eventName"),
    col("eventdate", "eventDate"),
];
const PHOTO_URL: Column = col("photourl", "photoURL");

fn required_columns(kind: RecordKind) -> &'static [Column] {
    match kind {
        RecordKind::Student => STUDENT_REQUIRED,
        RecordKind::Event => EVENT_REQUIRED,
    }
}

/// Values applied to every imported record.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Logo given to student records.
    pub default_logo: Option<ImageSource>,
    /// Signature given to student records.
    pub default_signature: Option<ImageSource>,
    /// Organisation written into every record's `organization` field.
    pub organization: Option<String>,
    /// Timestamp used for generated participant ids.
    pub now_millis: i64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            default_logo: Some(ImageSource::Url("logo.jpg".into())),
            default_signature: Some(ImageSource::Url("sign.jpg".into())),
            organization: None,
            now_millis: crate::record::now_millis(),
        }
    }
}

/// Lowercase and strip all whitespace.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse CSV text into records of `kind`.
pub fn parse_records(
    kind: RecordKind,
    text: &str,
    options: &ImportOptions,
) -> Result<Vec<Record>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = reader
        .records()
        .map(|r| r.map_err(|e| ImportError::Malformed(e.to_string())))
        .filter(|r| !matches!(r, Ok(row) if row.iter().all(str::is_empty)));

    let header_row = rows.next().transpose()?.ok_or(ImportError::NoRows)?;
    // First occurrence of a duplicated header wins.
    let mut headers: HashMap<String, usize> = HashMap::new();
    for (i, h) in header_row.iter().enumerate() {
        headers.entry(normalize_header(h)).or_insert(i);
    }

    for column in required_columns(kind) {
        if !headers.contains_key(column.header) {
            return Err(ImportError::MissingHeader {
                kind,
                header: column.header,
            });
        }
    }

    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        let row = row?;
        let value = |header: &str| {
            headers
                .get(header)
                .and_then(|&idx| row.get(idx))
                .filter(|v| !v.is_empty())
        };

        let mut record = Record::new(kind);
        for column in required_columns(kind) {
            record.set_field(column.field, value(column.header).unwrap_or(MISSING_VALUE));
        }
        if let Some(url) = value(PHOTO_URL.header) {
            record.set_field(PHOTO_URL.field, url);
        }
        match kind {
            RecordKind::Student => {
                for column in STUDENT_OPTIONAL {
                    record.set_field(column.field, value(column.header).unwrap_or(""));
                }
                record.set_image(crate::record::ImageField::Logo, options.default_logo.clone());
                record.set_image(
                    crate::record::ImageField::Signature,
                    options.default_signature.clone(),
                );
            }
            RecordKind::Event => {
                record.set_field("tagline", value("tagline").unwrap_or(STOCK_TAGLINE));
                let id = value("participantid")
                    .map(str::to_string)
                    .unwrap_or_else(|| generated_participant_id(options.now_millis, i));
                record.set_field("participantId", id);
            }
        }
        if let Some(org) = &options.organization {
            record.set_field("organization", org.clone());
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(ImportError::NoRows);
    }
    tracing::info!(kind = %kind, count = records.len(), "Imported records");
    Ok(records)
}

/// Example CSV offered for download, one sample row per kind.
pub fn sample_csv(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Event => concat!(
            "name,role,eventName,eventDate,photoURL,tagline,participantId\n",
            "Priya Sharma,Participant,TechFest 2025,2025-12-05,https://i.imgur.com/8b23K1b.jpg,Innovate and Inspire,TFP-12345\n",
        ),
        RecordKind::Student => concat!(
            "name,regNo,dept,gender,address,dob,phone,bloodGroup,photoURL\n",
            "AAKASH,23CS067,CSE,M,Chennai - Tamil Nadu,26-12-2004,953514874,O+,https://i.imgur.com/O9aDoT6.jpg\n",
        ),
    }
}
