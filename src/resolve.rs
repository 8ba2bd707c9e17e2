//! Placeholder resolution for card text.
//!
//! Text elements carry `{field}` tokens that are replaced with the record's
//! field values. A token whose field is unknown or empty is left verbatim, so
//! a template previewed against a sparse record still shows what goes where.

use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use crate::record::Record;

/// Field whose ISO dates are rendered in long form.
const DATE_FIELD: &str = "eventDate";

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("static token pattern"))
}

/// Replace every `{identifier}` token in `template` with the record's value.
pub fn resolve(template: &str, record: &Record) -> String {
    token_pattern()
        .replace_all(template, |caps: &Captures<'_>| match field_value(record, &caps[1]) {
            Some(value) => value.into_owned(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Display value for a single field, or `None` when the token should stay.
pub fn field_value<'a>(record: &'a Record, key: &str) -> Option<Cow<'a, str>> {
    let raw = record.field(key).filter(|v| !v.is_empty())?;
    if key == DATE_FIELD {
        if let Some(long) = format_long_date(raw) {
            return Some(Cow::Owned(long));
        }
    }
    Some(Cow::Borrowed(raw))
}

/// `2025-12-05` -> `December 5, 2025`. Anything else is not a date.
pub fn format_long_date(value: &str) -> Option<String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%B %-d, %Y").to_string())
}
