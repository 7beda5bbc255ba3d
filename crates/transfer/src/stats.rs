//! Run-wide transfer counters.
//!
//! One instance lives for the whole process. The engine records transfer
//! outcomes and byte totals itself; the orchestrator records discoveries
//! and skips. Callers must not double-count on top of engine outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, reset only at process start.
#[derive(Debug, Default)]
pub struct TransferStats {
    total_media: AtomicU64,
    transferred: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    total_bytes: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_media: u64,
    pub transferred: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total_bytes: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a discovered attachment candidate.
    pub fn record_discovered(&self) {
        self.total_media.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a successful transfer of `bytes` bytes.
    pub fn record_transferred(&self, bytes: u64) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Counts a failed transfer.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an attachment skipped as already present.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_media: self.total_media.load(Ordering::Relaxed),
            transferred: self.transferred.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}
