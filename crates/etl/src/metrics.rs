//! Metrics — per-run counters shared by the workers and the driver.
//!
//! All updates use `Ordering::Relaxed`; `snapshot()` is not transactional
//! across fields.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::worker::ScanSummary;

#[derive(Debug, Default)]
pub struct FileMetrics {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

/// Per-line counters (hot path).
#[derive(Debug, Default)]
pub struct LineMetrics {
    pub seen: AtomicU64,
    pub records: AtomicU64,
    pub non_entity: AtomicU64,
    pub skipped: AtomicU64,
    pub dropped_status: AtomicU64,
    pub unattributable: AtomicU64,
}

#[derive(Debug, Default)]
pub struct ExportMetrics {
    pub hours_exported: AtomicU64,
    pub hours_empty: AtomicU64,
    pub export_failures: AtomicU64,
    pub records_exported: AtomicU64,
}

#[derive(Debug, Default)]
pub struct RunMetrics {
    pub files: FileMetrics,
    pub lines: LineMetrics,
    pub exports: ExportMetrics,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the line counts of one successfully scanned file.
    pub fn record_scan(&self, scan: &ScanSummary) {
        self.lines.seen.fetch_add(scan.lines, Ordering::Relaxed);
        self.lines.records.fetch_add(scan.records, Ordering::Relaxed);
        self.lines.non_entity.fetch_add(scan.non_entity, Ordering::Relaxed);
        self.lines.skipped.fetch_add(scan.skipped, Ordering::Relaxed);
        self.lines.dropped_status.fetch_add(scan.dropped_status, Ordering::Relaxed);
        self.lines.unattributable.fetch_add(scan.unattributable, Ordering::Relaxed);
    }

    pub fn record_file(&self, ok: bool) {
        if ok {
            self.files.processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.files.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One accepted window batch carrying `records` export records.
    pub fn record_export(&self, records: usize) {
        self.exports.hours_exported.fetch_add(1, Ordering::Relaxed);
        self.exports.records_exported.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_empty_hour(&self) {
        self.exports.hours_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export_failure(&self) {
        self.exports.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_processed: self.files.processed.load(Ordering::Relaxed),
            files_failed: self.files.failed.load(Ordering::Relaxed),
            lines_seen: self.lines.seen.load(Ordering::Relaxed),
            records: self.lines.records.load(Ordering::Relaxed),
            non_entity_lines: self.lines.non_entity.load(Ordering::Relaxed),
            lines_skipped: self.lines.skipped.load(Ordering::Relaxed),
            lines_dropped_status: self.lines.dropped_status.load(Ordering::Relaxed),
            lines_unattributable: self.lines.unattributable.load(Ordering::Relaxed),
            hours_exported: self.exports.hours_exported.load(Ordering::Relaxed),
            hours_empty: self.exports.hours_empty.load(Ordering::Relaxed),
            export_failures: self.exports.export_failures.load(Ordering::Relaxed),
            records_exported: self.exports.records_exported.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub files_processed: u64,
    pub files_failed: u64,
    pub lines_seen: u64,
    pub records: u64,
    pub non_entity_lines: u64,
    pub lines_skipped: u64,
    pub lines_dropped_status: u64,
    pub lines_unattributable: u64,
    pub hours_exported: u64,
    pub hours_empty: u64,
    pub export_failures: u64,
    pub records_exported: u64,
}
