use serde_json::Value;

/// One form response: field name → raw value, in submission order.
///
/// `serde_json` is built with `preserve_order` so iteration follows the
/// order the backend returned the fields in.
pub type Submission = serde_json::Map<String, Value>;

/// A single file reference discovered inside a submission field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentCandidate {
    /// Download URL at the source backend.
    pub source_url: String,
    /// Filename suggested by the source metadata (unsanitized).
    pub suggested_filename: String,
}

/// Filename convention chosen for a form.
///
/// Decided once per form from its first submission and used only to pick
/// the duplicate-matching strategy; individual submissions still fall back
/// to row-based names when they lack the rich fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// `{date}_{category}_{row}{ext}`
    Rich,
    /// `row{row}_{base}`
    Fallback,
}
