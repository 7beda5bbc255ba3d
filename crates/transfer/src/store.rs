//! Capability traits for the two transports.
//!
//! The engine and orchestrator only ever talk to these traits; the concrete
//! Kobo and Graph clients implement them. Using trait seams keeps the core
//! testable with in-memory mocks.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use mediaferry_submission::Submission;

use crate::TransferError;

/// A form available at the source backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInfo {
    pub id: String,
    pub name: String,
}

/// One entry of a destination folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub is_folder: bool,
}

/// Opaque handle for an open chunked-upload session (for Graph this is the
/// session's upload URL).
#[derive(Debug, Clone)]
pub struct UploadHandle(pub String);

/// An open streaming read of one attachment.
pub struct AttachmentStream {
    /// Content length as reported by the source, if any.
    pub len: Option<u64>,
    /// The attachment bytes, in transport-sized reads.
    pub body: BoxStream<'static, Result<Bytes, TransferError>>,
}

impl std::fmt::Debug for AttachmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentStream")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl AttachmentStream {
    /// Wraps an in-memory payload (used by tests and the buffering path).
    pub fn from_bytes(data: Bytes) -> Self {
        let len = data.len() as u64;
        Self {
            len: Some(len),
            body: Box::pin(futures_util::stream::iter([Ok(data)])),
        }
    }
}

/// Read side: the forms backend.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Lists forms visible to the authenticated account.
    async fn list_forms(&self) -> Result<Vec<FormInfo>, TransferError>;

    /// Fetches all submissions of a form.
    ///
    /// Implementations try their endpoint fallback chain and return the
    /// first non-empty result; total failure is an empty list, not an error.
    async fn fetch_submissions(&self, form_id: &str) -> Result<Vec<Submission>, TransferError>;

    /// Opens a streaming read of one attachment URL.
    async fn open_attachment(&self, url: &str) -> Result<AttachmentStream, TransferError>;
}

/// Write side: the document store.
///
/// Paths are `/`-separated and relative to the store's root.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn folder_exists(&self, path: &str) -> Result<bool, TransferError>;

    /// Creates a folder, including missing ancestors. Idempotent.
    async fn create_folder(&self, path: &str) -> Result<(), TransferError>;

    /// Lists the direct children of a folder ("" = root).
    async fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>, TransferError>;

    /// Writes a whole file in one call.
    async fn write_small(&self, path: &str, data: Bytes) -> Result<(), TransferError>;

    /// Opens a chunked-upload session for the given file path.
    async fn create_upload_session(&self, path: &str) -> Result<UploadHandle, TransferError>;

    /// Writes one byte range. `total_len` is the full file size when known,
    /// 0 otherwise. An unaccepted destination status is an `Err`.
    async fn write_chunk(
        &self,
        session: &UploadHandle,
        offset: u64,
        data: Bytes,
        total_len: u64,
    ) -> Result<(), TransferError>;
}
