//! KoboToolbox API client.
//!
//! Implements the source side of the transfer: form listing, submission
//! fetching with an endpoint fallback chain, and streaming attachment
//! reads.

mod client;

pub use client::{DEFAULT_BASE_URL, KoboClient, KoboError};
