//! Deterministic destination filenames.
//!
//! Every attachment gets a name derived from its submission: a rich
//! `{date}_{category}_{row}{ext}` form when the submission carries usable
//! date and category fields, otherwise a `row{row}_{base}` fallback. The
//! chosen [`NamingScheme`] is returned explicitly so callers can thread it
//! into duplicate matching without hidden state.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

use crate::types::{NamingScheme, Submission};

/// Maximum sanitized filename length (stem truncated to fit).
const MAX_FILENAME_LEN: usize = 100;
const MAX_STEM_LEN: usize = 95;

/// Extension used when the base filename has none.
const DEFAULT_EXTENSION: &str = ".jpg";

/// Plain-date formats accepted by date normalization, in match order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Date-time formats accepted by date normalization, in match order.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w.\-]").expect("valid sanitize regex"));

static LOOSE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid date regex"));

/// Which submission fields feed the rich naming scheme.
#[derive(Debug, Clone)]
pub struct NamingOptions {
    pub date_field: String,
    pub category_field: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            date_field: "Date".into(),
            category_field: "Receipt_Type".into(),
        }
    }
}

/// A derived destination filename together with the scheme that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedName {
    pub filename: String,
    pub scheme: NamingScheme,
}

/// Derives the destination filename for one attachment.
///
/// `row` is the 1-based position of the submission within the form and
/// `base` the sanitized suggested filename. Missing or unparseable date or
/// category fields degrade silently to the fallback form; this function
/// never errors.
pub fn derive_filename(
    submission: &Submission,
    row: usize,
    base: &str,
    options: &NamingOptions,
) -> DerivedName {
    let date = normalize_date(&field_text(submission, &options.date_field));
    let category = clean_category(&field_text(submission, &options.category_field));

    let (name, scheme) = if !date.is_empty() && !category.is_empty() {
        let ext = extension_of(base);
        (format!("{date}_{category}_{row}{ext}"), NamingScheme::Rich)
    } else {
        (format!("row{row}_{base}"), NamingScheme::Fallback)
    };

    // Belt and braces: the assembled name may still contain characters the
    // destination rejects (e.g. from a raw category value).
    let filename = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    DerivedName { filename, scheme }
}

/// Sanitizes a suggested filename: unsafe characters become `_`, overlong
/// names are truncated with the extension preserved.
pub fn sanitize_filename(filename: &str) -> String {
    let safe = UNSAFE_CHARS_RE.replace_all(filename, "_").into_owned();
    if safe.chars().count() <= MAX_FILENAME_LEN {
        return safe;
    }
    let (stem, ext) = split_extension(&safe);
    let mut truncated: String = stem.chars().take(MAX_STEM_LEN).collect();
    truncated.push_str(ext);
    truncated
}

/// Sanitizes a form name into a destination folder name (whitespace kept).
pub fn safe_form_folder(form_name: &str) -> String {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s\-]").expect("valid folder regex"));
    RE.replace_all(form_name, "_").into_owned()
}

/// Sanitizes a field name into a category sub-folder name, capped at 50
/// characters.
pub fn safe_category_folder(field_name: &str) -> String {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\-]").expect("valid folder regex"));
    RE.replace_all(field_name, "_").chars().take(50).collect()
}

/// Reads a field as display text ("" when absent or null).
fn field_text(submission: &Submission, field: &str) -> String {
    match submission.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Normalizes a raw date value to `YYYY-MM-DD`, or "" if unrecognizable.
fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return dt.date().format("%Y-%m-%d").to_string();
        }
    }

    // Loose extraction: any YYYY-MM-DD substring counts.
    if let Some(caps) = LOOSE_DATE_RE.captures(raw) {
        return format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]);
    }

    String::new()
}

/// Cleans a category value for filename use: whitespace and path
/// separators become underscores, everything else outside
/// alphanumeric/underscore/dash is dropped.
fn clean_category(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect()
}

/// Returns the extension of `base` including the dot, or the default.
fn extension_of(base: &str) -> &str {
    match base.rfind('.') {
        Some(idx) if idx + 1 < base.len() => &base[idx..],
        _ => DEFAULT_EXTENSION,
    }
}

/// Splits a filename into (stem, extension-with-dot).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
