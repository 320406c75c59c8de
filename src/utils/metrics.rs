//! Archive Metrics
//!
//! Counters for archive traffic, soft failures and buffer pool efficiency.
//!
//! Uses atomic counters; readers work from a [`MetricsSnapshot`] copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Process-wide archive counters
#[derive(Debug)]
pub struct ArchiveMetrics {
    /// Archives packed to completion
    pub archives_packed: AtomicU64,
    /// Archives unpacked to completion
    pub archives_unpacked: AtomicU64,
    /// Bytes produced by completed packs
    pub bytes_packed: AtomicU64,
    /// Bytes consumed by completed unpacks
    pub bytes_unpacked: AtomicU64,
    /// First failures recorded on any archive
    pub transfer_failures: AtomicU64,
    /// Inbound entries dropped for an unknown kind
    pub properties_dropped: AtomicU64,
    /// Packing buffers served from the pool
    pub pool_hits: AtomicU64,
    /// Packing buffers freshly allocated
    pub pool_misses: AtomicU64,
    start_time: Instant,
}

impl ArchiveMetrics {
    pub fn new() -> Self {
        Self {
            archives_packed: AtomicU64::new(0),
            archives_unpacked: AtomicU64::new(0),
            bytes_packed: AtomicU64::new(0),
            bytes_unpacked: AtomicU64::new(0),
            transfer_failures: AtomicU64::new(0),
            properties_dropped: AtomicU64::new(0),
            pool_hits: AtomicU64::new(0),
            pool_misses: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn archive_packed(&self, byte_count: u64) {
        self.archives_packed.fetch_add(1, Ordering::Relaxed);
        self.bytes_packed.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn archive_unpacked(&self, byte_count: u64) {
        self.archives_unpacked.fetch_add(1, Ordering::Relaxed);
        self.bytes_unpacked.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn transfer_failure(&self) {
        self.transfer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn property_dropped(&self) {
        self.properties_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pool_hit(&self) {
        self.pool_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pool_miss(&self) {
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            archives_packed: self.archives_packed.load(Ordering::Relaxed),
            archives_unpacked: self.archives_unpacked.load(Ordering::Relaxed),
            bytes_packed: self.bytes_packed.load(Ordering::Relaxed),
            bytes_unpacked: self.bytes_unpacked.load(Ordering::Relaxed),
            transfer_failures: self.transfer_failures.load(Ordering::Relaxed),
            properties_dropped: self.properties_dropped.load(Ordering::Relaxed),
            pool_hits: self.pool_hits.load(Ordering::Relaxed),
            pool_misses: self.pool_misses.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            archives_packed = snapshot.archives_packed,
            archives_unpacked = snapshot.archives_unpacked,
            bytes_packed = snapshot.bytes_packed,
            bytes_unpacked = snapshot.bytes_unpacked,
            transfer_failures = snapshot.transfer_failures,
            properties_dropped = snapshot.properties_dropped,
            pool_hits = snapshot.pool_hits,
            pool_misses = snapshot.pool_misses,
            uptime_seconds = snapshot.uptime_seconds,
            "Archive metrics snapshot"
        );
    }
}

impl Default for ArchiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ArchiveMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub archives_packed: u64,
    pub archives_unpacked: u64,
    pub bytes_packed: u64,
    pub bytes_unpacked: u64,
    pub transfer_failures: u64,
    pub properties_dropped: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Fraction of buffer acquisitions served from the pool
    pub fn pool_hit_rate(&self) -> f64 {
        let total = self.pool_hits + self.pool_misses;
        if total == 0 {
            return 0.0;
        }
        self.pool_hits as f64 / total as f64
    }
}

static METRICS: once_cell::sync::Lazy<ArchiveMetrics> =
    once_cell::sync::Lazy::new(ArchiveMetrics::new);

pub fn global_metrics() -> &'static ArchiveMetrics {
    &METRICS
}

/// Timer for measuring a pack or unpack pass
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ArchiveMetrics::new();
        metrics.archive_packed(10);
        metrics.archive_packed(5);
        metrics.archive_unpacked(7);
        metrics.transfer_failure();
        metrics.pool_hit();
        metrics.pool_miss();
        metrics.pool_hit();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.archives_packed, 2);
        assert_eq!(snapshot.bytes_packed, 15);
        assert_eq!(snapshot.archives_unpacked, 1);
        assert_eq!(snapshot.bytes_unpacked, 7);
        assert_eq!(snapshot.transfer_failures, 1);
        assert!((snapshot.pool_hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let metrics = ArchiveMetrics::new();
        let before = metrics.snapshot();
        metrics.property_dropped();
        assert_eq!(before.properties_dropped, 0);
        assert_eq!(metrics.snapshot().properties_dropped, 1);
    }
}
