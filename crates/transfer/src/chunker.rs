//! Re-chunking of network reads into fixed-size upload ranges.
//!
//! The source yields bytes in whatever sizes the transport produced; the
//! destination wants exact fixed-size ranges with a running offset. The
//! assembler buffers pushed reads and hands out full chunks as they become
//! available.

use bytes::{Bytes, BytesMut};

use crate::UPLOAD_CHUNK_SIZE;

/// Accumulates pushed byte slices and emits fixed-size chunks.
pub struct ChunkAssembler {
    chunk_size: usize,
    buf: BytesMut,
}

impl ChunkAssembler {
    /// Creates an assembler. A `chunk_size` of 0 selects
    /// [`UPLOAD_CHUNK_SIZE`].
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            UPLOAD_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            chunk_size,
            buf: BytesMut::new(),
        }
    }

    /// Appends one transport read.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Takes the next full chunk, if one is buffered.
    pub fn next_full(&mut self) -> Option<Bytes> {
        if self.buf.len() >= self.chunk_size {
            Some(self.buf.split_to(self.chunk_size).freeze())
        } else {
            None
        }
    }

    /// Drains the final partial chunk at end of stream.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
