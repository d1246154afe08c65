//! Replication counters.
//!
//! Counters are atomic so request handlers on different shards never
//! contend on them. Read them through [`ReplicationStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a server replication manager.
///
/// All counters are monotonically increasing.
#[derive(Debug, Default)]
pub struct ReplicationStats {
    applies_accepted: AtomicU64,
    applies_unchanged: AtomicU64,
    applies_ineligible: AtomicU64,
    requests_unauthorized: AtomicU64,
    records_removed: AtomicU64,
    records_revalidated_out: AtomicU64,
    frames_broadcast: AtomicU64,
    syncs_sent: AtomicU64,
    malformed_frames: AtomicU64,
    checkpoints: AtomicU64,
}

impl ReplicationStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_apply_accepted(&self) {
        self.applies_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_apply_unchanged(&self) {
        self.applies_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_apply_ineligible(&self) {
        self.applies_ineligible.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unauthorized(&self) {
        self.requests_unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self) {
        self.records_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_revalidated_out(&self, count: u64) {
        self.records_revalidated_out.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast(&self, delivered: u64) {
        self.frames_broadcast.fetch_add(delivered, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self) {
        self.syncs_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            applies_accepted: self.applies_accepted.load(Ordering::Relaxed),
            applies_unchanged: self.applies_unchanged.load(Ordering::Relaxed),
            applies_ineligible: self.applies_ineligible.load(Ordering::Relaxed),
            requests_unauthorized: self.requests_unauthorized.load(Ordering::Relaxed),
            records_removed: self.records_removed.load(Ordering::Relaxed),
            records_revalidated_out: self.records_revalidated_out.load(Ordering::Relaxed),
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            syncs_sent: self.syncs_sent.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ReplicationStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Apply requests that changed the store.
    pub applies_accepted: u64,
    /// Apply requests equal to the stored value.
    pub applies_unchanged: u64,
    /// Apply requests dropped by the verification gate.
    pub applies_ineligible: u64,
    /// Requests dropped because the requester may not touch the subject.
    pub requests_unauthorized: u64,
    /// Records deleted by Remove requests or departures.
    pub records_removed: u64,
    /// Records deleted because they failed revalidation.
    pub records_revalidated_out: u64,
    /// Frames handed to connection sinks by broadcasts.
    pub frames_broadcast: u64,
    /// Sync frames sent to newly connected clients.
    pub syncs_sent: u64,
    /// Client frames that failed to decode.
    pub malformed_frames: u64,
    /// Successful checkpoints.
    pub checkpoints: u64,
}
