//! Result types returned by garbage collection runs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::CatalogStats;

/// Outcome of one garbage collection run
#[derive(Debug, Clone, Default, Serialize)]
pub struct GarbageCollectionInfo {
    /// Catalog records the resolver reported as unreferenced
    pub candidates: usize,
    /// Catalog rows deleted
    pub rows_removed: usize,
    /// Binaries deleted from at least one provider
    pub binaries_removed: usize,
    /// Sum of the lengths of the removed rows
    pub bytes_removed: u64,
    /// Candidates skipped because a reader or writer held them
    pub skipped_in_use: usize,
    /// Candidates whose deletion failed
    pub failures: usize,
    pub stats_before: CatalogStats,
    pub stats_after: CatalogStats,
    pub started_at: Option<DateTime<Utc>>,
    pub scan_finished_at: Option<DateTime<Utc>>,
    pub sweep_finished_at: Option<DateTime<Utc>>,
    /// The interrupt signal stopped the sweep early
    pub cancelled: bool,
    pub errors: Vec<String>,
}

impl GarbageCollectionInfo {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Returns true if the run completed without any per-candidate failure.
    pub fn is_success(&self) -> bool {
        self.failures == 0
    }

    pub fn has_deletions(&self) -> bool {
        self.rows_removed > 0
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.failures += 1;
        self.errors.push(error.into());
    }

    /// Wall time of the sweep phase
    pub fn sweep_duration(&self) -> Option<chrono::Duration> {
        Some(self.sweep_finished_at? - self.scan_finished_at?)
    }

    pub fn summary(&self) -> String {
        format!(
            "GC {}: {} candidates, {} rows and {} binaries removed ({} bytes), {} in use, {} failures",
            if self.cancelled { "cancelled" } else { "completed" },
            self.candidates,
            self.rows_removed,
            self.binaries_removed,
            self.bytes_removed,
            self.skipped_in_use,
            self.failures
        )
    }
}

/// Summary statistics across periodic GC cycles
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcStatistics {
    /// Total number of collection cycles run
    pub cycles_completed: usize,
    /// Cycles that failed before producing a result
    pub cycles_failed: usize,
    pub total_rows_removed: usize,
    pub total_bytes_removed: u64,
    pub total_skipped_in_use: usize,
    pub total_failures: usize,
    pub prune_runs: usize,
    pub total_orphans_pruned: usize,
    /// Average rows removed per cycle
    pub average_deletions_per_cycle: f64,
}

impl GcStatistics {
    /// Updates statistics with a new GC result
    pub fn update(&mut self, result: &GarbageCollectionInfo) {
        self.cycles_completed += 1;
        self.total_rows_removed += result.rows_removed;
        self.total_bytes_removed += result.bytes_removed;
        self.total_skipped_in_use += result.skipped_in_use;
        self.total_failures += result.failures;

        self.average_deletions_per_cycle =
            self.total_rows_removed as f64 / self.cycles_completed as f64;
    }

    pub fn record_failure(&mut self) {
        self.cycles_failed += 1;
    }

    pub fn record_prune(&mut self, orphans_removed: usize) {
        self.prune_runs += 1;
        self.total_orphans_pruned += orphans_removed;
    }

    /// Returns a formatted summary of the statistics
    pub fn summary(&self) -> String {
        format!(
            "GC Statistics:\n\
             Cycles completed: {}\n\
             Cycles failed: {}\n\
             Rows removed: {}\n\
             Bytes removed: {}\n\
             Skipped in use: {}\n\
             Failures: {}\n\
             Orphans pruned: {} in {} runs\n\
             Average deletions/cycle: {:.2}",
            self.cycles_completed,
            self.cycles_failed,
            self.total_rows_removed,
            self.total_bytes_removed,
            self.total_skipped_in_use,
            self.total_failures,
            self.total_orphans_pruned,
            self.prune_runs,
            self.average_deletions_per_cycle
        )
    }

    /// Resets all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
