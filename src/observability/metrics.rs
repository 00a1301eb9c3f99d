//! Counters for a mirror service
//!
//! - Counters only, monotonic, reset on process start
//! - Relaxed atomics; a snapshot may straddle concurrent updates

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters owned by one mirror service
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Uploads the primary accepted
    uploads: AtomicU64,
    /// Bytes accepted by the primary
    uploaded_bytes: AtomicU64,
    /// Uploads the primary refused
    primary_failures: AtomicU64,
    /// Successful mirror copies made during uploads
    mirror_uploads: AtomicU64,
    /// Mirror copies that failed, during uploads or reconciliation
    mirror_upload_failures: AtomicU64,
    /// Mirror calls abandoned at the deadline
    mirror_timeouts: AtomicU64,
    /// Delete and prefix-delete operations
    deletes: AtomicU64,
    mirror_delete_failures: AtomicU64,
    /// Copies made by reconciliation
    mirrored: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_uploads(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_uploaded_bytes(&self, bytes: u64) {
        self.uploaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_primary_failures(&self) {
        self.primary_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_mirror_uploads(&self, count: u64) {
        self.mirror_uploads.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_mirror_upload_failures(&self, count: u64) {
        self.mirror_upload_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_mirror_timeouts(&self) {
        self.mirror_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_mirror_delete_failures(&self, count: u64) {
        self.mirror_delete_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_mirrored(&self, count: u64) {
        self.mirrored.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            uploaded_bytes: self.uploaded_bytes.load(Ordering::Relaxed),
            primary_failures: self.primary_failures.load(Ordering::Relaxed),
            mirror_uploads: self.mirror_uploads.load(Ordering::Relaxed),
            mirror_upload_failures: self.mirror_upload_failures.load(Ordering::Relaxed),
            mirror_timeouts: self.mirror_timeouts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            mirror_delete_failures: self.mirror_delete_failures.load(Ordering::Relaxed),
            mirrored: self.mirrored.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads: u64,
    pub uploaded_bytes: u64,
    pub primary_failures: u64,
    pub mirror_uploads: u64,
    pub mirror_upload_failures: u64,
    pub mirror_timeouts: u64,
    pub deletes: u64,
    pub mirror_delete_failures: u64,
    pub mirrored: u64,
}
