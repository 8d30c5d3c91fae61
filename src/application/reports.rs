//! Reports returned by the maintenance operations of the binary store.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::domain::value_objects::ExternalMode;
use crate::infrastructure::storage::TransferOutcome;

/// Outcome of an orphan prune
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    /// Enumerable providers visited
    pub providers_scanned: usize,
    /// Binaries found on those providers
    pub binaries_scanned: usize,
    /// Binaries without a catalog row that were removed
    pub orphans_removed: usize,
    pub bytes_freed: u64,
    /// Orphans left alone because a writer still held them
    pub skipped_in_use: usize,
    /// Leftover upload files removed
    pub stale_temp_removed: usize,
    pub errors: Vec<String>,
}

impl PruneReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Prune scanned {} binaries on {} providers: {} orphans removed ({} bytes), {} in use, {} stale temp files, {} errors",
            self.binaries_scanned,
            self.providers_scanned,
            self.orphans_removed,
            self.bytes_freed,
            self.skipped_in_use,
            self.stale_temp_removed,
            self.errors.len()
        )
    }
}

/// Outcome of attaching or detaching an external filestore
#[derive(Debug, Clone, Serialize)]
pub struct ExternalStoreReport {
    pub root: PathBuf,
    pub mode: ExternalMode,
    /// Catalog records visited
    pub records: usize,
    pub already_local: usize,
    pub linked: usize,
    pub copied: usize,
    pub moved: usize,
    /// Records neither store could serve
    pub missing: usize,
    pub bytes_transferred: u64,
    /// Whether the chain now reflects the request
    pub chain_updated: bool,
    pub errors: Vec<String>,
}

impl ExternalStoreReport {
    pub fn new(root: PathBuf, mode: ExternalMode) -> Self {
        Self {
            root,
            mode,
            records: 0,
            already_local: 0,
            linked: 0,
            copied: 0,
            moved: 0,
            missing: 0,
            bytes_transferred: 0,
            chain_updated: false,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: TransferOutcome) {
        self.records += 1;
        match outcome {
            TransferOutcome::AlreadyLocal => self.already_local += 1,
            TransferOutcome::Linked => self.linked += 1,
            TransferOutcome::Copied(bytes) => {
                self.copied += 1;
                self.bytes_transferred += bytes;
            }
            TransferOutcome::Moved(bytes) => {
                self.moved += 1;
                self.bytes_transferred += bytes;
            }
            TransferOutcome::Missing => self.missing += 1,
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.records += 1;
        self.errors.push(error.into());
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records against {} ({}): {} local, {} linked, {} copied, {} moved, {} missing, {} bytes transferred, {} errors",
            self.records,
            self.root.display(),
            self.mode,
            self.already_local,
            self.linked,
            self.copied,
            self.moved,
            self.missing,
            self.bytes_transferred,
            self.errors.len()
        )
    }
}

/// Result of the store health check
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub details: Value,
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_report_tallies_outcomes() {
        let mut report = ExternalStoreReport::new(PathBuf::from("/legacy"), ExternalMode::Evict);
        report.record(TransferOutcome::Moved(10));
        report.record(TransferOutcome::Copied(5));
        report.record(TransferOutcome::AlreadyLocal);
        report.record(TransferOutcome::Missing);
        report.record_error("boom");

        assert_eq!(report.records, 5);
        assert_eq!(report.bytes_transferred, 15);
        assert_eq!(report.missing, 1);
        assert!(!report.is_success());
        assert!(report.summary().contains("evict"));
    }

    #[test]
    fn test_prune_summary() {
        let report = PruneReport {
            providers_scanned: 1,
            binaries_scanned: 3,
            orphans_removed: 2,
            ..PruneReport::default()
        };
        assert!(report.is_success());
        assert!(report.summary().contains("2 orphans removed"));
    }
}
