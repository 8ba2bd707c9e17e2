//! # Records
//!
//! A [`Record`] is the data bound to a card: a flat bag of string fields plus
//! the nullable image fields (`photo`, `logo`, `signature`).
//!
//! The record kind is an explicit discriminant fixed at construction. Nothing
//! downstream infers it from which fields happen to be present, so a student
//! record that gains a `participantId` is still a student record.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Stock tagline used when an event record has none.
pub const STOCK_TAGLINE: &str = "Innovate. Create. Inspire.";

/// Value given to required fields that were left empty.
pub const MISSING_VALUE: &str = "N/A";

/// Which card family a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Student,
    Event,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Student => "student",
            RecordKind::Event => "event",
        }
    }

    /// Field that identifies the subject in the QR payload.
    pub fn primary_id_field(self) -> &'static str {
        match self {
            RecordKind::Student => "regNo",
            RecordKind::Event => "participantId",
        }
    }

    /// Fields that always exist on a record of this kind, with their defaults.
    fn default_fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            RecordKind::Student => &[
                ("name", MISSING_VALUE),
                ("regNo", MISSING_VALUE),
                ("dept", MISSING_VALUE),
                ("gender", ""),
                ("address", ""),
                ("dob", ""),
                ("phone", ""),
                ("bloodGroup", ""),
            ],
            RecordKind::Event => &[
                ("name", MISSING_VALUE),
                ("role", MISSING_VALUE),
                ("eventName", MISSING_VALUE),
                ("eventDate", MISSING_VALUE),
                ("tagline", STOCK_TAGLINE),
            ],
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(RecordKind::Student),
            "event" => Ok(RecordKind::Event),
            other => Err(format!("unknown record kind '{}'", other)),
        }
    }
}

/// The image slots a template can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageField {
    Photo,
    Logo,
    Signature,
}

impl ImageField {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageField::Photo => "photo",
            ImageField::Logo => "logo",
            ImageField::Signature => "signature",
        }
    }
}

/// Image data attached to a record.
///
/// Either embedded bytes (serialized as a `data:` URL) or a reference to an
/// image somewhere else (http URL or asset path). Serializes as a plain string
/// so records round-trip through JSON the same way the card editor sends them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageSource {
    Embedded { mime: String, data: Vec<u8> },
    Url(String),
}

impl ImageSource {
    pub fn embedded(mime: impl Into<String>, data: Vec<u8>) -> Self {
        ImageSource::Embedded {
            mime: mime.into(),
            data,
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL or keep the string as a URL.
    pub fn parse(src: &str) -> Self {
        parse_data_url(src).unwrap_or_else(|| ImageSource::Url(src.to_string()))
    }

    /// The string form used in rendered cards (`data:` URL or plain URL).
    pub fn to_src(&self) -> String {
        match self {
            ImageSource::Embedded { mime, data } => {
                format!("data:{};base64,{}", mime, BASE64.encode(data))
            }
            ImageSource::Url(url) => url.clone(),
        }
    }

    pub fn mime(&self) -> Option<&str> {
        match self {
            ImageSource::Embedded { mime, .. } => Some(mime),
            ImageSource::Url(_) => None,
        }
    }
}

fn parse_data_url(src: &str) -> Option<ImageSource> {
    let rest = src.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let data = BASE64.decode(payload.trim()).ok()?;
    Some(ImageSource::Embedded {
        mime: mime.to_string(),
        data,
    })
}

impl From<String> for ImageSource {
    fn from(s: String) -> Self {
        ImageSource::parse(&s)
    }
}

impl From<ImageSource> for String {
    fn from(src: ImageSource) -> Self {
        src.to_src()
    }
}

/// A student or event participant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRecord")]
pub struct Record {
    kind: RecordKind,
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
    photo: Option<ImageSource>,
    logo: Option<ImageSource>,
    signature: Option<ImageSource>,
}

/// Wire shape of a record before defaults are applied.
#[derive(Deserialize)]
struct RawRecord {
    kind: RecordKind,
    #[serde(default)]
    photo: Option<ImageSource>,
    #[serde(default)]
    logo: Option<ImageSource>,
    #[serde(default)]
    signature: Option<ImageSource>,
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        let mut record = Record::new(raw.kind);
        for (key, value) in raw.fields {
            record.set_field(key, value);
        }
        record.photo = raw.photo;
        record.logo = raw.logo;
        record.signature = raw.signature;
        record
    }
}

impl Record {
    /// Create a record of `kind` with every declared field at its default.
    pub fn new(kind: RecordKind) -> Self {
        let fields = kind
            .default_fields()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut record = Self {
            kind,
            fields,
            photo: None,
            logo: None,
            signature: None,
        };
        if kind == RecordKind::Event {
            record.set_field("participantId", generated_participant_id(now_millis(), 0));
        }
        record
    }

    pub fn student(name: &str, reg_no: &str, dept: &str) -> Self {
        let mut record = Self::new(RecordKind::Student);
        record.set_field("name", name);
        record.set_field("regNo", reg_no);
        record.set_field("dept", dept);
        record
    }

    pub fn event(name: &str, role: &str, event_name: &str, event_date: &str) -> Self {
        let mut record = Self::new(RecordKind::Event);
        record.set_field("name", name);
        record.set_field("role", role);
        record.set_field("eventName", event_name);
        record.set_field("eventDate", event_date);
        record
    }

    /// Fixed preview record used by the editor and the template carousel.
    pub fn sample(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Student => {
                let mut r = Self::student("AAKASH", "23CS067", "CSE");
                for (k, v) in [
                    ("gender", "M"),
                    ("address", "Chennai\nTamil Nadu"),
                    ("dob", "26-12-2004"),
                    ("phone", "953514874"),
                    ("bloodGroup", "O+"),
                    ("organization", "Nandha Engineering College"),
                    ("participantId", "SID-23CS067"),
                ] {
                    r.set_field(k, v);
                }
                r.photo = Some(ImageSource::Url("sample.webp".into()));
                r.logo = Some(ImageSource::Url("logo.jpg".into()));
                r.signature = Some(ImageSource::Url("sign.jpg".into()));
                r
            }
            RecordKind::Event => {
                let mut r = Self::event("Priya Sharma", "Participant", "TechFest 2025", "2025-12-05");
                for (k, v) in [
                    ("tagline", "Innovating Beyond Limits 🚀"),
                    ("department", "Computer Science"),
                    ("eventType", "Tech"),
                    ("eventCategory", "Workshop"),
                    ("participantId", "PID-12345"),
                    ("organization", "Innovate Corp"),
                    ("templateId", "modern"),
                ] {
                    r.set_field(k, v);
                }
                r.photo = Some(ImageSource::Url("https://i.imgur.com/8b23K1b.jpg".into()));
                r
            }
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Look up a string field by its card name (e.g. `regNo`, `eventDate`).
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Set a string field. The record kind is not a field and cannot be changed.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key == "kind" {
            return;
        }
        self.fields.insert(key, value.into());
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn image(&self, field: ImageField) -> Option<&ImageSource> {
        match field {
            ImageField::Photo => self.photo.as_ref(),
            ImageField::Logo => self.logo.as_ref(),
            ImageField::Signature => self.signature.as_ref(),
        }
    }

    pub fn set_image(&mut self, field: ImageField, image: Option<ImageSource>) {
        match field {
            ImageField::Photo => self.photo = image,
            ImageField::Logo => self.logo = image,
            ImageField::Signature => self.signature = image,
        }
    }

    pub fn photo(&self) -> Option<&ImageSource> {
        self.photo.as_ref()
    }

    pub fn name(&self) -> &str {
        self.field("name").unwrap_or(MISSING_VALUE)
    }

    /// `regNo` for students, `participantId` for events.
    pub fn primary_id(&self) -> Option<&str> {
        self.field(self.kind.primary_id_field())
    }

    pub fn organization(&self) -> Option<&str> {
        self.field("organization")
    }

    /// Source URL for the photo, as given by the `photoURL` import column.
    pub fn photo_url(&self) -> Option<&str> {
        self.field("photoURL").filter(|u| !u.is_empty())
    }

    /// Base file name for single-card exports: `<Name>_<regNo>` for students.
    pub fn export_stem(&self) -> String {
        let name = underscore_whitespace(self.name());
        match self.kind {
            RecordKind::Student => format!("{}_{}", name, self.field("regNo").unwrap_or("")),
            RecordKind::Event => name,
        }
    }
}

/// Replace every whitespace character with `_`.
pub fn underscore_whitespace(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Placeholder participant id for rows imported without one.
pub fn generated_participant_id(timestamp_ms: i64, row: usize) -> String {
    format!("P-{}-{}", timestamp_ms, row)
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
