//! Microsoft Graph client.
//!
//! Implements the destination side of the transfer against a SharePoint
//! document library: app-only authentication, drive discovery, folder and
//! file writes, and chunked upload sessions.

mod auth;
mod client;

pub use auth::GraphCredentials;
pub use client::{DEFAULT_GRAPH_BASE, DEFAULT_LOGIN_BASE, GraphClient, GraphError};
