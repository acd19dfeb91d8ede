//! Per-pipeline frame counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the coordinator on the producer thread and read
/// from anywhere for status display.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    streamed: AtomicU64,
    captured: AtomicU64,
    discarded: AtomicU64,
    encode_failures: AtomicU64,
    dispatch_drops: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Frames delivered by the source.
    pub received: u64,
    /// Video frames queued for sending.
    pub streamed: u64,
    /// Stills queued for sending.
    pub captured: u64,
    /// Frames released without encoding (idle, streaming off, or drained
    /// by a teardown).
    pub discarded: u64,
    pub encode_failures: u64,
    /// Encoded messages dropped because the outbox was full or closed.
    pub dispatch_drops: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_streamed(&self) {
        self.streamed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_drop(&self) {
        self.dispatch_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            streamed: self.streamed.load(Ordering::Relaxed),
            captured: self.captured.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            dispatch_drops: self.dispatch_drops.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Counter deltas since `earlier`.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.saturating_sub(earlier.received),
            streamed: self.streamed.saturating_sub(earlier.streamed),
            captured: self.captured.saturating_sub(earlier.captured),
            discarded: self.discarded.saturating_sub(earlier.discarded),
            encode_failures: self.encode_failures.saturating_sub(earlier.encode_failures),
            dispatch_drops: self.dispatch_drops.saturating_sub(earlier.dispatch_drops),
        }
    }
}
