//! Submission data model, attachment extraction and filename derivation.
//!
//! A submission is one form response: an ordered map of field name to raw
//! value. Fields may hold attachment metadata in several shapes (real JSON,
//! JSON double-encoded into a string, or loose text containing URLs); the
//! extractor normalizes all of them into [`AttachmentCandidate`]s.

pub mod extract;
pub mod naming;
mod types;

pub use extract::extract_candidates;
pub use naming::{DerivedName, NamingOptions, derive_filename, sanitize_filename};
pub use types::{AttachmentCandidate, NamingScheme, Submission};
