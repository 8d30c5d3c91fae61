use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::errors::BinaryStoreError;
use crate::application::gc::config::GcConfig;
use crate::application::gc::results::GarbageCollectionInfo;
use crate::application::ports::{
    BinaryCatalog, BinaryProvider, CatalogError, InterruptSignal, ReferenceResolver,
    StatusReporter,
};
use crate::application::usage::UsageTracker;
use crate::domain::entities::BinaryRecord;

enum SweepOutcome {
    Removed { row: bool, binary: bool },
    InUse,
}

/// Two-phase collector: scan the catalog for unreferenced records, then sweep
/// them one by one under an exclusive deletion claim.
pub struct BinaryCollector {
    catalog: Arc<dyn BinaryCatalog>,
    usage: Arc<UsageTracker>,
    config: GcConfig,
}

impl BinaryCollector {
    pub fn new(catalog: Arc<dyn BinaryCatalog>, usage: Arc<UsageTracker>, config: GcConfig) -> Self {
        Self {
            catalog,
            usage,
            config,
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Run one collection.
    ///
    /// Fails only when the scan itself fails; per-candidate problems are
    /// counted in the returned info.
    pub async fn collect(
        &self,
        provider: Arc<dyn BinaryProvider>,
        resolver: Arc<dyn ReferenceResolver>,
        signal: &dyn InterruptSignal,
        reporter: &dyn StatusReporter,
    ) -> Result<GarbageCollectionInfo, BinaryStoreError> {
        let mut info = GarbageCollectionInfo::new();

        // Scan
        info.stats_before = self.catalog.count_and_size().await?;
        let candidates = self
            .catalog
            .find_deletion_candidates(Arc::clone(&resolver), self.config.min_candidate_age)
            .await?;
        info.candidates = candidates.len();
        info.scan_finished_at = Some(Utc::now());
        reporter.status(&format!(
            "Found {} unreferenced binaries out of {}",
            info.candidates, info.stats_before.count
        ));

        // Sweep
        let batch_size = self.config.batch_size.max(1);
        for (index, record) in candidates.iter().enumerate() {
            if index % batch_size == 0 && signal.pause_or_break().await {
                info!(
                    processed = index,
                    remaining = candidates.len() - index,
                    "Garbage collection interrupted"
                );
                info.cancelled = true;
                break;
            }

            match self.sweep_one(&provider, &resolver, record).await {
                Ok(SweepOutcome::Removed { row, binary }) => {
                    if row {
                        info.rows_removed += 1;
                        info.bytes_removed += record.length();
                    }
                    if binary {
                        info.binaries_removed += 1;
                    }
                }
                Ok(SweepOutcome::InUse) => {
                    info.skipped_in_use += 1;
                    reporter.warn(&format!(
                        "Skipping {}: in use",
                        record.primary_hash()
                    ));
                }
                Err(e) => {
                    warn!(hash = %record.primary_hash(), "Failed to collect binary: {}", e);
                    reporter.error(&format!(
                        "Failed to collect {}: {}",
                        record.primary_hash(),
                        e
                    ));
                    info.add_error(format!("{}: {}", record.primary_hash(), e));
                }
            }
        }

        info.sweep_finished_at = Some(Utc::now());
        match self.catalog.count_and_size().await {
            Ok(stats) => info.stats_after = stats,
            Err(e) => warn!("Could not read catalog stats after sweep: {}", e),
        }

        info!("{}", info.summary());
        reporter.status(&info.summary());
        Ok(info)
    }

    async fn sweep_one(
        &self,
        provider: &Arc<dyn BinaryProvider>,
        resolver: &Arc<dyn ReferenceResolver>,
        record: &BinaryRecord,
    ) -> Result<SweepOutcome, BinaryStoreError> {
        let hash = record.primary_hash();

        if !self.usage.try_claim_deletion(hash) {
            info!(hash = %hash, "Binary in use, skipping deletion");
            return Ok(SweepOutcome::InUse);
        }

        let result = async {
            let dependents = resolver
                .delete_dependents(hash)
                .await
                .map_err(|e| CatalogError::Resolver(e.to_string()))?;
            if dependents > 0 {
                debug!(hash = %hash, dependents, "Removed dependent records");
            }

            let row = self.catalog.delete(hash).await?;
            let binary = provider.delete(hash).await?;
            Ok::<_, BinaryStoreError>(SweepOutcome::Removed { row, binary })
        }
        .await;

        // Always return the hash to the untracked state
        self.usage.release_deletion(hash);
        result
    }
}
