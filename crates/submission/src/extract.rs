//! Attachment extraction from raw submission field values.
//!
//! Field values arrive in several shapes depending on which export endpoint
//! produced the submission: a real JSON array of attachment objects, the
//! same array double-encoded into a string (with escaped or single quotes),
//! or plain text that merely contains download URLs. Extraction tries an
//! ordered chain of JSON repair strategies and degrades to a regex URL scan;
//! it never fails — an uninterpretable field yields no candidates.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::types::AttachmentCandidate;

/// Markers that make a field worth inspecting at all.
const MEDIA_MARKERS: &[&str] = &["http", "attachment", ".jpg", ".jpeg", ".png", ".pdf"];

/// Extensions accepted by the URL-scan fallback.
const MEDIA_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".pdf", ".mp4"];

/// Placeholder when no filename can be derived from a URL.
const DEFAULT_FILENAME: &str = "media_file";

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s,'"}\]]+(?:\.[^\s,'"}\]]+)+"#).expect("valid URL regex")
});

/// Extracts attachment candidates from one field value.
///
/// Returns an empty vec for empty values, the literal text `nan`, or text
/// without media markers. Never errors.
pub fn extract_candidates(value: &Value) -> Vec<AttachmentCandidate> {
    let text = match value {
        Value::Null => return Vec::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let text = text.trim();
    if text.is_empty() || text == "nan" {
        return Vec::new();
    }

    let lower = text.to_lowercase();
    if !MEDIA_MARKERS.iter().any(|m| lower.contains(m)) {
        return Vec::new();
    }

    // Structured parse first; fall through to the URL scan if it yields
    // nothing usable.
    if text.contains('[') || text.contains('{') {
        if let Some(items) = parse_attachment_list(text) {
            let candidates: Vec<AttachmentCandidate> =
                items.iter().filter_map(candidate_from_element).collect();
            if !candidates.is_empty() {
                return candidates;
            }
        }
    }

    scan_urls(text)
}

/// Ordered JSON repair chain: each step produces a candidate string to
/// parse, first successful parse wins.
fn parse_attachment_list(raw: &str) -> Option<Vec<Value>> {
    let attempts: [fn(&str) -> String; 3] = [
        |s| s.to_string(),
        unquote_and_unescape,
        |s| unquote_and_unescape(s).replace('\'', "\""),
    ];

    for attempt in attempts {
        let candidate = attempt(raw);
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Array(items)) => return Some(items),
            Ok(obj @ Value::Object(_)) => return Some(vec![obj]),
            // A scalar parse (e.g. a still-quoted inner payload) is not a
            // usable result; let the next repair step have a go.
            Ok(_) | Err(_) => continue,
        }
    }
    None
}

/// Strips one layer of outer quoting and undoes common escaping.
fn unquote_and_unescape(raw: &str) -> String {
    let mut s = raw;
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s = &s[1..s.len() - 1];
    }
    s.replace("\\\"", "\"").replace("\\/", "/")
}

/// Builds a candidate from one parsed attachment object.
///
/// Download URL variants are tried in preference order; elements without
/// any usable URL are skipped.
fn candidate_from_element(element: &Value) -> Option<AttachmentCandidate> {
    let obj = element.as_object()?;

    let url = ["download_large_url", "download_url", "download_medium_url"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .filter(|u| !u.is_empty())?;

    let filename = obj
        .get("filename")
        .and_then(Value::as_str)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| filename_from_url(url));

    Some(AttachmentCandidate {
        source_url: url.to_string(),
        suggested_filename: filename,
    })
}

/// Last-resort extraction: scan raw text for URL-shaped substrings whose
/// path ends in a known media extension.
fn scan_urls(text: &str) -> Vec<AttachmentCandidate> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['\\', '"', '\'']))
        .filter(|url| {
            let lower = url.to_lowercase();
            MEDIA_EXTENSIONS.iter().any(|ext| lower.contains(ext))
        })
        .map(|url| AttachmentCandidate {
            source_url: url.to_string(),
            suggested_filename: filename_from_url(url),
        })
        .collect()
}

/// Derives a filename from a URL: last path segment, query stripped.
fn filename_from_url(url: &str) -> String {
    let name = url
        .rsplit('/')
        .next()
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("");
    if name.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        name.to_string()
    }
}
