//! Streaming transfer of one attachment.
//!
//! Chooses a single-shot or chunked upload by reported size, streams bytes
//! through memory, and reports the outcome. Per-item failures are returned
//! as unsuccessful outcomes (and counted) — only cancellation surfaces as
//! an error, because it aborts the whole run.

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chunker::ChunkAssembler;
use crate::stats::TransferStats;
use crate::store::{AttachmentStream, DestinationStore, SourceProvider};
use crate::{SMALL_UPLOAD_LIMIT, TransferError, UPLOAD_CHUNK_SIZE};

/// Result of one attachment transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    /// Bytes credited to the run total. Zero for failed transfers.
    pub bytes: u64,
}

impl TransferOutcome {
    fn succeeded(bytes: u64) -> Self {
        Self {
            success: true,
            bytes,
        }
    }

    fn failed() -> Self {
        Self {
            success: false,
            bytes: 0,
        }
    }
}

/// Moves one attachment's bytes from source to destination.
///
/// The engine owns the transferred/failed counters: it records every
/// outcome on the shared [`TransferStats`] itself, so callers must not
/// count outcomes again.
pub struct TransferEngine<'a> {
    source: &'a dyn SourceProvider,
    store: &'a dyn DestinationStore,
    stats: &'a TransferStats,
    cancel: CancellationToken,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        source: &'a dyn SourceProvider,
        store: &'a dyn DestinationStore,
        stats: &'a TransferStats,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            stats,
            cancel,
        }
    }

    /// Transfers one attachment to `{folder}/{filename}`.
    ///
    /// Network and status failures are caught, logged, counted and reported
    /// as a failed outcome; there is no retry. `Err` is returned only when
    /// the run was cancelled.
    pub async fn transfer(
        &self,
        source_url: &str,
        folder: &str,
        filename: &str,
    ) -> Result<TransferOutcome, TransferError> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let path = format!("{folder}/{filename}");

        let stream = match self.source.open_attachment(source_url).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(url = source_url, error = %e, "could not open attachment");
                self.stats.record_failed();
                return Ok(TransferOutcome::failed());
            }
        };

        match stream.len {
            Some(len) if len < SMALL_UPLOAD_LIMIT => {
                debug!(path = %path, len, "single-shot upload");
                self.upload_small(stream, &path).await
            }
            _ => {
                debug!(path = %path, len = ?stream.len, "chunked upload");
                self.upload_chunked(stream, &path).await
            }
        }
    }

    /// Buffers the whole attachment and writes it in one call.
    async fn upload_small(
        &self,
        stream: AttachmentStream,
        path: &str,
    ) -> Result<TransferOutcome, TransferError> {
        let data = match self.buffer_all(stream).await {
            Ok(data) => data,
            Err(TransferError::Cancelled) => return Err(TransferError::Cancelled),
            Err(e) => {
                warn!(path, error = %e, "source read failed");
                self.stats.record_failed();
                return Ok(TransferOutcome::failed());
            }
        };

        let len = data.len() as u64;
        match self.store.write_small(path, data).await {
            Ok(()) => {
                self.stats.record_transferred(len);
                Ok(TransferOutcome::succeeded(len))
            }
            Err(e) => {
                warn!(path, error = %e, "destination write failed");
                self.stats.record_failed();
                Ok(TransferOutcome::failed())
            }
        }
    }

    /// Streams the attachment through an upload session in fixed ranges.
    ///
    /// If session creation fails, degrades to the full-buffer single-shot
    /// path regardless of size.
    async fn upload_chunked(
        &self,
        stream: AttachmentStream,
        path: &str,
    ) -> Result<TransferOutcome, TransferError> {
        let session = match self.store.create_upload_session(path).await {
            Ok(session) => session,
            Err(e) => {
                debug!(path, error = %e, "session init failed, degrading to single-shot");
                return self.upload_small(stream, path).await;
            }
        };

        let total_len = stream.len.unwrap_or(0);
        let mut body = stream.body;
        let mut assembler = ChunkAssembler::new(UPLOAD_CHUNK_SIZE);
        let mut offset: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let read = match body.next().await {
                Some(Ok(data)) => Some(data),
                Some(Err(e)) => {
                    warn!(path, error = %e, "source read failed mid-stream");
                    self.stats.record_failed();
                    return Ok(TransferOutcome::failed());
                }
                None => None,
            };

            let at_end = read.is_none();
            if let Some(data) = read {
                assembler.push(&data);
            }

            // Full chunks as they fill up; the final partial one at EOF.
            loop {
                let chunk = match assembler.next_full() {
                    Some(chunk) => chunk,
                    None if at_end => match assembler.finish() {
                        Some(chunk) => chunk,
                        None => break,
                    },
                    None => break,
                };

                if self.cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }

                let chunk_len = chunk.len() as u64;
                if let Err(e) = self
                    .store
                    .write_chunk(&session, offset, chunk, total_len)
                    .await
                {
                    warn!(path, offset, error = %e, "chunk rejected");
                    self.stats.record_failed();
                    return Ok(TransferOutcome::failed());
                }
                offset += chunk_len;
            }

            if at_end {
                break;
            }
        }

        self.stats.record_transferred(offset);
        Ok(TransferOutcome::succeeded(offset))
    }

    /// Collects the remaining stream into memory, honoring cancellation.
    async fn buffer_all(&self, stream: AttachmentStream) -> Result<Bytes, TransferError> {
        let mut body = stream.body;
        let mut buf = BytesMut::with_capacity(stream.len.unwrap_or(0) as usize);
        while let Some(read) = body.next().await {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            buf.extend_from_slice(&read?);
        }
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttachmentStream, ChildEntry, FormInfo, UploadHandle};
    use async_trait::async_trait;
    use mediaferry_submission::Submission;
    use std::sync::Mutex;

    /// Source serving a fixed payload in fixed-size reads, with a
    /// configurable advertised length.
    struct FakeSource {
        payload: Vec<u8>,
        read_size: usize,
        advertised_len: Option<u64>,
        fail_open: bool,
    }

    #[async_trait]
    impl SourceProvider for FakeSource {
        async fn list_forms(&self) -> Result<Vec<FormInfo>, TransferError> {
            Ok(Vec::new())
        }

        async fn fetch_submissions(&self, _: &str) -> Result<Vec<Submission>, TransferError> {
            Ok(Vec::new())
        }

        async fn open_attachment(&self, _: &str) -> Result<AttachmentStream, TransferError> {
            if self.fail_open {
                return Err(TransferError::Source("connection refused".into()));
            }
            let reads: Vec<Result<Bytes, TransferError>> = self
                .payload
                .chunks(self.read_size.max(1))
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(AttachmentStream {
                len: self.advertised_len,
                body: Box::pin(futures_util::stream::iter(reads)),
            })
        }
    }

    #[derive(Default)]
    struct FakeStore {
        small_writes: Mutex<Vec<(String, usize)>>,
        chunks: Mutex<Vec<(u64, usize, u64)>>,
        fail_session: bool,
        fail_chunk_at: Option<usize>,
    }

    #[async_trait]
    impl DestinationStore for FakeStore {
        async fn folder_exists(&self, _: &str) -> Result<bool, TransferError> {
            Ok(true)
        }

        async fn create_folder(&self, _: &str) -> Result<(), TransferError> {
            Ok(())
        }

        async fn list_children(&self, _: &str) -> Result<Vec<ChildEntry>, TransferError> {
            Ok(Vec::new())
        }

        async fn write_small(&self, path: &str, data: Bytes) -> Result<(), TransferError> {
            self.small_writes
                .lock()
                .unwrap()
                .push((path.to_string(), data.len()));
            Ok(())
        }

        async fn create_upload_session(&self, path: &str) -> Result<UploadHandle, TransferError> {
            if self.fail_session {
                return Err(TransferError::Store("503".into()));
            }
            Ok(UploadHandle(format!("session:{path}")))
        }

        async fn write_chunk(
            &self,
            _: &UploadHandle,
            offset: u64,
            data: Bytes,
            total_len: u64,
        ) -> Result<(), TransferError> {
            let mut chunks = self.chunks.lock().unwrap();
            if let Some(fail_at) = self.fail_chunk_at
                && chunks.len() == fail_at
            {
                return Err(TransferError::Store("status 500".into()));
            }
            chunks.push((offset, data.len(), total_len));
            Ok(())
        }
    }

    fn small_source(len: usize) -> FakeSource {
        FakeSource {
            payload: vec![7u8; len],
            read_size: 1024,
            advertised_len: Some(len as u64),
            fail_open: false,
        }
    }

    #[tokio::test]
    async fn small_file_uses_single_shot() {
        let source = small_source(2048);
        let store = FakeStore::default();
        let stats = TransferStats::new();
        let engine = TransferEngine::new(&source, &store, &stats, CancellationToken::new());

        let outcome = engine
            .transfer("http://src/a.jpg", "Run/Form", "a.jpg")
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.bytes, 2048);
        let writes = store.small_writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], ("Run/Form/a.jpg".to_string(), 2048));
        assert!(store.chunks.lock().unwrap().is_empty());

        let snap = stats.snapshot();
        assert_eq!(snap.transferred, 1);
        assert_eq!(snap.total_bytes, 2048);
    }

    #[tokio::test]
    async fn large_reported_length_uses_chunked_path() {
        // Advertised above the limit; actual payload spans three ranges.
        let payload_len = UPLOAD_CHUNK_SIZE * 2 + 100;
        let source = FakeSource {
            payload: vec![1u8; payload_len],
            read_size: 8192,
            advertised_len: Some(10 * 1024 * 1024),
            fail_open: false,
        };
        let store = FakeStore::default();
        let stats = TransferStats::new();
        let engine = TransferEngine::new(&source, &store, &stats, CancellationToken::new());

        let outcome = engine
            .transfer("http://src/big.mp4", "Run/Form", "big.mp4")
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.bytes, payload_len as u64);

        let chunks = store.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], (0, UPLOAD_CHUNK_SIZE, 10 * 1024 * 1024));
        assert_eq!(
            chunks[1],
            (UPLOAD_CHUNK_SIZE as u64, UPLOAD_CHUNK_SIZE, 10 * 1024 * 1024)
        );
        assert_eq!(chunks[2], ((UPLOAD_CHUNK_SIZE * 2) as u64, 100, 10 * 1024 * 1024));
        assert!(store.small_writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_length_uses_chunked_path() {
        let source = FakeSource {
            payload: vec![2u8; 1000],
            read_size: 100,
            advertised_len: None,
            fail_open: false,
        };
        let store = FakeStore::default();
        let stats = TransferStats::new();
        let engine = TransferEngine::new(&source, &store, &stats, CancellationToken::new());

        let outcome = engine
            .transfer("http://src/x", "Run/Form", "x.bin")
            .await
            .unwrap();

        assert!(outcome.success);
        let chunks = store.chunks.lock().unwrap();
        // Total length unknown → reported as 0 in the range header.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], (0, 1000, 0));
    }

    #[tokio::test]
    async fn first_chunk_failure_credits_zero_bytes() {
        let source = FakeSource {
            payload: vec![3u8; UPLOAD_CHUNK_SIZE * 2],
            read_size: 65536,
            advertised_len: Some(8 * 1024 * 1024),
            fail_open: false,
        };
        let store = FakeStore {
            fail_chunk_at: Some(0),
            ..Default::default()
        };
        let stats = TransferStats::new();
        let engine = TransferEngine::new(&source, &store, &stats, CancellationToken::new());

        let outcome = engine
            .transfer("http://src/x", "Run/Form", "x.bin")
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.bytes, 0);
        let snap = stats.snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.transferred, 0);
        assert_eq!(snap.total_bytes, 0);
    }

    #[tokio::test]
    async fn session_init_failure_degrades_to_single_shot() {
        let len = UPLOAD_CHUNK_SIZE * 3;
        let source = FakeSource {
            payload: vec![4u8; len],
            read_size: 8192,
            advertised_len: Some(len as u64 + SMALL_UPLOAD_LIMIT),
            fail_open: false,
        };
        let store = FakeStore {
            fail_session: true,
            ..Default::default()
        };
        let stats = TransferStats::new();
        let engine = TransferEngine::new(&source, &store, &stats, CancellationToken::new());

        let outcome = engine
            .transfer("http://src/x", "Run/Form", "x.bin")
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.bytes, len as u64);
        let writes = store.small_writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, len);
    }

    #[tokio::test]
    async fn open_failure_is_counted_not_propagated() {
        let source = FakeSource {
            payload: Vec::new(),
            read_size: 1,
            advertised_len: None,
            fail_open: true,
        };
        let store = FakeStore::default();
        let stats = TransferStats::new();
        let engine = TransferEngine::new(&source, &store, &stats, CancellationToken::new());

        let outcome = engine
            .transfer("http://src/x", "Run/Form", "x.bin")
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(stats.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let source = small_source(16);
        let store = FakeStore::default();
        let stats = TransferStats::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = TransferEngine::new(&source, &store, &stats, cancel);

        let result = engine.transfer("http://src/x", "Run/Form", "x.bin").await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
        // Cancellation is not a per-item failure.
        assert_eq!(stats.snapshot().failed, 0);
    }
}
