//! The binary store facade.
//!
//! Orchestrates the catalog and the provider chain. Content enters through
//! [`BinaryStore::add_stream`], leaves through [`BinaryStore::get_stream`],
//! and is reclaimed by [`BinaryStore::garbage_collect`] once the reference
//! resolver no longer knows it.

use serde_json::json;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::errors::BinaryStoreError;
use crate::application::gc::{BinaryCollector, GarbageCollectionInfo, GcConfig};
use crate::application::ports::{
    BinaryCatalog, BlobReader, CatalogError, InterruptSignal, LocalStore, ReferenceResolver,
    StatusReporter,
};
use crate::application::reports::{ExternalStoreReport, HealthReport, PruneReport};
use crate::application::usage::{UsageGuard, UsageTracker};
use crate::domain::entities::{BinaryRecord, CatalogStats};
use crate::domain::value_objects::{BinaryInfo, ContentHash};
use crate::infrastructure::storage::{ExternalStoreConfig, ProviderChain};

/// Hashes per catalog lookup while pruning
const PRUNE_CHUNK: usize = 500;

/// Progress is reported every this many records during attach/detach
const PROGRESS_EVERY: usize = 1000;

/// Content to add, optionally tagged with the info the caller expects
pub struct BinaryUpload {
    reader: BlobReader,
    expected: Option<BinaryInfo>,
}

impl BinaryUpload {
    pub fn new(reader: BlobReader) -> Self {
        Self {
            reader,
            expected: None,
        }
    }

    /// Upload whose digests the caller already knows.
    ///
    /// If the catalog has the hash the stream is never read.
    pub fn tagged(reader: BlobReader, expected: BinaryInfo) -> Self {
        Self {
            reader,
            expected: Some(expected),
        }
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Box::pin(Cursor::new(data.into())))
    }

    pub fn expected(&self) -> Option<&BinaryInfo> {
        self.expected.as_ref()
    }
}

pub struct BinaryStore {
    catalog: Arc<dyn BinaryCatalog>,
    chain: Arc<ProviderChain>,
    usage: Arc<UsageTracker>,
    collector: BinaryCollector,
    // GC, prune, attach and detach run one at a time
    maintenance: tokio::sync::Mutex<()>,
}

impl BinaryStore {
    pub fn new(catalog: Arc<dyn BinaryCatalog>, chain: Arc<ProviderChain>, gc: GcConfig) -> Self {
        let usage = Arc::clone(chain.usage());
        let collector = BinaryCollector::new(Arc::clone(&catalog), Arc::clone(&usage), gc);
        Self {
            catalog,
            chain,
            usage,
            collector,
            maintenance: tokio::sync::Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn BinaryCatalog> {
        &self.catalog
    }

    pub fn chain(&self) -> &Arc<ProviderChain> {
        &self.chain
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn gc_config(&self) -> &GcConfig {
        self.collector.config()
    }

    /// Catalog content whose bytes are already present in the chain.
    ///
    /// Returns `None` when no provider holds the bytes with that length.
    pub async fn add_record(
        &self,
        hash: ContentHash,
        secondary_hash: &str,
        length: u64,
    ) -> Result<Option<BinaryInfo>, BinaryStoreError> {
        let info = BinaryInfo::new(hash, secondary_hash, length);

        if let Some(existing) = self.catalog.load(info.primary_hash()).await? {
            self.cross_check(existing.info(), &info)?;
            return Ok(Some(existing.into_info()));
        }

        // Keep GC away between the existence check and the insert
        let _guard = self
            .usage
            .protect(info.primary_hash())
            .ok_or_else(|| BinaryStoreError::InUse(info.primary_hash().to_string()))?;

        if !self
            .chain
            .head()
            .exists(info.primary_hash(), info.length())
            .await?
        {
            debug!(hash = %info.primary_hash(), "No provider holds the binary");
            return Ok(None);
        }

        self.insert(&info).await?;
        Ok(Some(info))
    }

    /// Store a stream and catalog it, deduplicating by primary hash.
    pub async fn add_stream(&self, upload: BinaryUpload) -> Result<BinaryInfo, BinaryStoreError> {
        let BinaryUpload { reader, expected } = upload;

        if let Some(expected) = &expected {
            if let Some(existing) = self.catalog.load(expected.primary_hash()).await? {
                self.cross_check(existing.info(), expected)?;
                debug!(hash = %expected.primary_hash(), "Tagged upload already stored");
                return Ok(existing.into_info());
            }
        }

        let receipt = self.chain.head().write(reader).await?;
        // Held until the catalog row is committed so prune leaves the file alone
        let _guard = receipt.guard;
        let info = receipt.info;

        if let Some(expected) = &expected {
            self.cross_check(expected, &info)?;
        }

        match self.insert(&info).await {
            Ok(stored) => Ok(stored),
            Err(BinaryStoreError::Catalog(source)) => {
                warn!(hash = %info.primary_hash(), "Binary stored but not cataloged: {}", source);
                Err(BinaryStoreError::RetryableInsert { info, source })
            }
            Err(e) => Err(e),
        }
    }

    /// Insert a catalog row; a lost insert race is settled by re-reading
    async fn insert(&self, info: &BinaryInfo) -> Result<BinaryInfo, BinaryStoreError> {
        match self.catalog.create(info).await {
            Ok(record) => {
                info!(hash = %info.primary_hash(), length = info.length(), "Binary cataloged");
                Ok(record.into_info())
            }
            Err(CatalogError::DuplicateKey(_)) => {
                let existing = self.catalog.load(info.primary_hash()).await?.ok_or_else(|| {
                    CatalogError::Corrupt(format!(
                        "{} reported as duplicate but not found",
                        info.primary_hash()
                    ))
                })?;
                self.cross_check(existing.info(), info)?;
                debug!(hash = %info.primary_hash(), "Concurrent insert already cataloged binary");
                Ok(existing.into_info())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn cross_check(&self, stored: &BinaryInfo, other: &BinaryInfo) -> Result<(), BinaryStoreError> {
        stored.verify_same(other).map_err(|e| {
            error!(hash = %stored.primary_hash(), "{}", e);
            BinaryStoreError::from(e)
        })
    }

    /// Open a binary for reading; the content is protected until the reader drops.
    pub async fn get_stream(&self, hash: &ContentHash) -> Result<BlobReader, BinaryStoreError> {
        Ok(self.chain.head().read(hash).await?)
    }

    pub async fn find(&self, hash: &ContentHash) -> Result<Option<BinaryInfo>, BinaryStoreError> {
        Ok(self.catalog.load(hash).await?.map(BinaryRecord::into_info))
    }

    pub async fn find_many(
        &self,
        hashes: &[ContentHash],
    ) -> Result<Vec<BinaryInfo>, BinaryStoreError> {
        Ok(self
            .catalog
            .search(hashes)
            .await?
            .into_iter()
            .map(BinaryRecord::into_info)
            .collect())
    }

    pub async fn find_all(&self) -> Result<Vec<BinaryInfo>, BinaryStoreError> {
        Ok(self
            .catalog
            .find_all()
            .await?
            .into_iter()
            .map(BinaryRecord::into_info)
            .collect())
    }

    pub async fn count_and_size(&self) -> Result<CatalogStats, BinaryStoreError> {
        Ok(self.catalog.count_and_size().await?)
    }

    /// Register an external user of `hash`; `false` while it is being deleted.
    pub fn increment_usage(&self, hash: &ContentHash) -> bool {
        self.usage.increment(hash)
    }

    pub fn decrement_usage(&self, hash: &ContentHash) {
        self.usage.decrement(hash)
    }

    /// RAII form of [`increment_usage`](Self::increment_usage)
    pub fn protect(&self, hash: &ContentHash) -> Option<UsageGuard> {
        self.usage.protect(hash)
    }

    /// Remove binaries that exist on a provider but not in the catalog.
    pub async fn prune(&self, reporter: &dyn StatusReporter) -> PruneReport {
        let _maintenance = self.maintenance.lock().await;
        let mut report = PruneReport::default();

        let provider = self.chain.internal();
        let Some(local) = provider.local_store() else {
            reporter.status(&format!("Provider {} cannot be enumerated", provider.name()));
            return report;
        };

        report.providers_scanned += 1;
        reporter.status(&format!("Pruning {}", local.location()));

        match local
            .remove_stale_temp(self.collector.config().stale_temp_age)
            .await
        {
            Ok(removed) => report.stale_temp_removed += removed,
            Err(e) => report.errors.push(format!("temp cleanup: {}", e)),
        }

        let binaries = match local.list_local().await {
            Ok(binaries) => binaries,
            Err(e) => {
                reporter.error(&format!("Listing {} failed: {}", local.location(), e));
                report.errors.push(e.to_string());
                return report;
            }
        };
        report.binaries_scanned += binaries.len();

        for chunk in binaries.chunks(PRUNE_CHUNK) {
            let hashes: Vec<ContentHash> = chunk.iter().map(|b| b.hash.clone()).collect();
            let known: HashSet<ContentHash> = match self.catalog.search(&hashes).await {
                Ok(records) => records
                    .into_iter()
                    .map(|r| r.primary_hash().clone())
                    .collect(),
                Err(e) => {
                    reporter.error(&format!("Catalog lookup failed: {}", e));
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            for hash in hashes.iter().filter(|h| !known.contains(*h)) {
                self.prune_one(local, hash, &mut report, reporter).await;
            }
        }

        info!("{}", report.summary());
        reporter.status(&report.summary());
        report
    }

    async fn prune_one(
        &self,
        local: &dyn LocalStore,
        hash: &ContentHash,
        report: &mut PruneReport,
        reporter: &dyn StatusReporter,
    ) {
        if !self.usage.try_claim_deletion(hash) {
            debug!(hash = %hash, "Orphan candidate in use, keeping it");
            report.skipped_in_use += 1;
            return;
        }

        // A writer may have committed its row since the lookup
        let result = match self.catalog.exists(hash).await {
            Ok(true) => Ok(None),
            Ok(false) => local.remove_local(hash).await.map(Some).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        self.usage.release_deletion(hash);

        match result {
            Ok(Some(bytes)) => {
                info!(hash = %hash, bytes, "Removed orphan binary");
                report.orphans_removed += 1;
                report.bytes_freed += bytes;
            }
            Ok(None) => {}
            Err(e) => {
                reporter.warn(&format!("Could not prune {}: {}", hash, e));
                report.errors.push(format!("{}: {}", hash, e));
            }
        }
    }

    /// Scan for unreferenced binaries and delete them.
    pub async fn garbage_collect(
        &self,
        resolver: Arc<dyn ReferenceResolver>,
        signal: &dyn InterruptSignal,
        reporter: &dyn StatusReporter,
    ) -> Result<GarbageCollectionInfo, BinaryStoreError> {
        let _maintenance = self.maintenance.lock().await;
        self.collector
            .collect(self.chain.head(), resolver, signal, reporter)
            .await
    }

    /// Put an external filestore behind the internal store and apply its
    /// mode to every cataloged binary.
    pub async fn attach_external_store(
        &self,
        config: ExternalStoreConfig,
        reporter: &dyn StatusReporter,
    ) -> Result<ExternalStoreReport, BinaryStoreError> {
        let _maintenance = self.maintenance.lock().await;

        if !tokio::fs::metadata(&config.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(BinaryStoreError::InvalidRequest(format!(
                "{} is not a directory",
                config.root.display()
            )));
        }

        let wrapper = self
            .chain
            .attach(config.clone())
            .map_err(|e| BinaryStoreError::InvalidRequest(e.to_string()))?;

        let mut report = ExternalStoreReport::new(config.root.clone(), config.mode);
        report.chain_updated = true;
        reporter.status(&format!(
            "Attached {} in {} mode",
            config.root.display(),
            config.mode
        ));

        for record in self.catalog.find_all().await? {
            match wrapper.connect(&record).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    reporter.warn(&format!("Connect {} failed: {}", record.primary_hash(), e));
                    report.record_error(format!("{}: {}", record.primary_hash(), e));
                }
            }
            if report.records % PROGRESS_EVERY == 0 {
                reporter.status(&format!("Processed {} records", report.records));
            }
        }

        info!("{}", report.summary());
        reporter.status(&report.summary());
        Ok(report)
    }

    /// Pull externally held content into the internal store, then remove the
    /// external store from the chain.
    ///
    /// When any record fails to transfer the chain is left unchanged.
    pub async fn detach_external_store(
        &self,
        reporter: &dyn StatusReporter,
    ) -> Result<ExternalStoreReport, BinaryStoreError> {
        let _maintenance = self.maintenance.lock().await;

        let (config, wrapper) = self.chain.external().ok_or_else(|| {
            BinaryStoreError::InvalidRequest("no external store attached".to_string())
        })?;
        let mut report = ExternalStoreReport::new(config.root.clone(), config.mode);

        for record in self.catalog.find_all().await? {
            match wrapper.disconnect(&record).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    reporter.warn(&format!(
                        "Disconnect {} failed: {}",
                        record.primary_hash(),
                        e
                    ));
                    report.record_error(format!("{}: {}", record.primary_hash(), e));
                }
            }
            if report.records % PROGRESS_EVERY == 0 {
                reporter.status(&format!("Processed {} records", report.records));
            }
        }

        if report.is_success() {
            self.chain.detach();
            report.chain_updated = true;
            reporter.status(&format!("Detached {}", config.root.display()));
        } else {
            error!(
                errors = report.errors.len(),
                "External store kept attached, some content could not be copied"
            );
            reporter.error("External store kept attached, some content could not be copied");
        }

        info!("{}", report.summary());
        Ok(report)
    }

    /// Check that the catalog answers and every provider is reachable.
    pub async fn health_check(&self) -> HealthReport {
        let mut issues = Vec::new();

        let probe = ContentHash::zero();
        let start = Instant::now();
        let catalog = match self.catalog.exists(&probe).await {
            Ok(_) => json!({ "status": "healthy", "latency_ms": start.elapsed().as_millis() as u64 }),
            Err(e) => {
                issues.push(format!("catalog: {}", e));
                json!({ "status": "unhealthy", "error": e.to_string() })
            }
        };

        let start = Instant::now();
        let providers = match self.chain.head().check_health().await {
            Ok(()) => json!({ "status": "healthy", "latency_ms": start.elapsed().as_millis() as u64 }),
            Err(e) => {
                issues.push(format!("providers: {}", e));
                json!({ "status": "unhealthy", "error": e.to_string() })
            }
        };

        let external = self.chain.external().map(|(config, _)| {
            json!({ "root": config.root.display().to_string(), "mode": config.mode.to_string() })
        });

        if !issues.is_empty() {
            warn!(issues = ?issues, "Health check failed");
        }

        HealthReport {
            healthy: issues.is_empty(),
            details: json!({
                "catalog": catalog,
                "providers": providers,
                "chain": self.chain.describe(),
                "external": external,
                "tracked_hashes": self.usage.tracked(),
            }),
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockBinaryCatalog;
    use crate::infrastructure::storage::{ContentHasher, InternalStore};
    use tempfile::TempDir;

    async fn store_with(catalog: MockBinaryCatalog, dir: &TempDir) -> BinaryStore {
        let chain = Arc::new(ProviderChain::new(
            Arc::new(UsageTracker::new()),
            InternalStore::Filesystem {
                root: dir.path().to_path_buf(),
                durable_writes: false,
            },
            None,
        ));
        chain.init().await.unwrap();
        BinaryStore::new(Arc::new(catalog), chain, GcConfig::default())
    }

    #[tokio::test]
    async fn test_duplicate_key_rereads_and_verifies() {
        let dir = TempDir::new().unwrap();
        let expected = ContentHasher::hash_bytes(b"raced").unwrap();
        let stored = BinaryRecord::new(expected.clone());

        let mut catalog = MockBinaryCatalog::new();
        catalog
            .expect_create()
            .returning(|info| Err(CatalogError::DuplicateKey(info.primary_hash().to_string())));
        catalog
            .expect_load()
            .returning(move |_| Ok(Some(stored.clone())));

        let store = store_with(catalog, &dir).await;
        let info = store.add_stream(BinaryUpload::from_bytes(&b"raced"[..])).await.unwrap();
        assert_eq!(info, expected);
        assert_eq!(store.usage().tracked(), 0);
    }

    #[tokio::test]
    async fn test_catalog_failure_is_retryable_insert() {
        let dir = TempDir::new().unwrap();
        let mut catalog = MockBinaryCatalog::new();
        catalog
            .expect_create()
            .returning(|_| Err(CatalogError::Corrupt("disk full".to_string())));

        let store = store_with(catalog, &dir).await;
        let err = store
            .add_stream(BinaryUpload::from_bytes(&b"retry me"[..]))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        let info = err.stored_info().unwrap();
        assert_eq!(info.length(), 8);
        assert!(store
            .chain()
            .head()
            .exists(info.primary_hash(), 8)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_tagged_upload_short_circuits_when_cataloged() {
        let dir = TempDir::new().unwrap();
        let expected = ContentHasher::hash_bytes(b"known").unwrap();
        let stored = BinaryRecord::new(expected.clone());

        let mut catalog = MockBinaryCatalog::new();
        catalog
            .expect_load()
            .returning(move |_| Ok(Some(stored.clone())));
        catalog.expect_create().never();

        let store = store_with(catalog, &dir).await;
        let info = store
            .add_stream(BinaryUpload::tagged(
                Box::pin(Cursor::new(Vec::new())),
                expected.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(info, expected);
    }

    #[tokio::test]
    async fn test_tag_disagreeing_with_content_is_mismatch() {
        let dir = TempDir::new().unwrap();
        let actual = ContentHasher::hash_bytes(b"actual").unwrap();
        let lying_tag = BinaryInfo::new(actual.primary_hash().clone(), actual.secondary_hash(), 99);

        let mut catalog = MockBinaryCatalog::new();
        catalog.expect_load().returning(|_| Ok(None));
        catalog.expect_create().never();

        let store = store_with(catalog, &dir).await;
        let err = store
            .add_stream(BinaryUpload::tagged(
                Box::pin(Cursor::new(b"actual".to_vec())),
                lying_tag,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, BinaryStoreError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_add_record_without_bytes_returns_none() {
        let dir = TempDir::new().unwrap();
        let mut catalog = MockBinaryCatalog::new();
        catalog.expect_load().returning(|_| Ok(None));
        catalog.expect_create().never();

        let store = store_with(catalog, &dir).await;
        let info = ContentHasher::hash_bytes(b"nowhere").unwrap();
        let result = store
            .add_record(info.primary_hash().clone(), info.secondary_hash(), info.length())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
