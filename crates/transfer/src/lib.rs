//! Incremental, idempotent media transfer core.
//!
//! Moves attachment bytes from a forms backend to a document store without
//! touching local disk. The hard parts live here: the destination catalog
//! that answers "already transferred?", the size-gated single-shot vs.
//! chunked upload engine, and the capability traits that keep both
//! transports mockable.

pub mod catalog;
pub mod chunker;
pub mod engine;
pub mod stats;
pub mod store;

pub use catalog::DestinationCatalog;
pub use chunker::ChunkAssembler;
pub use engine::{TransferEngine, TransferOutcome};
pub use stats::{StatsSnapshot, TransferStats};
pub use store::{
    AttachmentStream, ChildEntry, DestinationStore, FormInfo, SourceProvider, UploadHandle,
};

/// Below this reported content length an attachment is buffered whole and
/// written in a single destination call.
pub const SMALL_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

/// Fixed chunk size for ranged uploads. Graph upload sessions require
/// ranges in multiples of 320 KiB.
pub const UPLOAD_CHUNK_SIZE: usize = 320 * 1024;

/// Errors produced by the transfer core and its transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("source read failed: {0}")]
    Source(String),

    #[error("destination write failed: {0}")]
    Store(String),

    #[error("cancelled")]
    Cancelled,
}
