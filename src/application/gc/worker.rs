use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::errors::BinaryStoreError;
use crate::application::gc::results::{GarbageCollectionInfo, GcStatistics};
use crate::application::gc::scheduler::TaskScheduler;
use crate::application::ports::{ReferenceResolver, StatusReporter, TracingReporter};
use crate::application::store::BinaryStore;

/// Periodic driver for garbage collection and orphan pruning.
///
/// Every tick runs one collection against the store. Pruning walks the whole
/// physical medium, so it only runs every `prune_multiplier` ticks.
///
/// # Examples
///
/// ```rust,ignore
/// let gc = Arc::new(GarbageCollector::new(store, resolver));
/// let token = gc.cancellation_token();
/// tokio::spawn(Arc::clone(&gc).run());
/// // later
/// token.cancel();
/// ```
pub struct GarbageCollector {
    store: Arc<BinaryStore>,
    resolver: Arc<dyn ReferenceResolver>,
    reporter: Arc<dyn StatusReporter>,
    prune_scheduler: TaskScheduler,
    statistics: Mutex<GcStatistics>,
    token: CancellationToken,
}

impl GarbageCollector {
    pub fn new(store: Arc<BinaryStore>, resolver: Arc<dyn ReferenceResolver>) -> Self {
        let prune_scheduler = TaskScheduler::new(store.gc_config().prune_interval());
        Self {
            store,
            resolver,
            reporter: Arc::new(TracingReporter),
            prune_scheduler,
            statistics: Mutex::new(GcStatistics::default()),
            token: CancellationToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Token stopping both the loop and a sweep in progress
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn statistics(&self) -> GcStatistics {
        self.statistics.lock().clone()
    }

    /// Run garbage collection loop until cancelled
    pub async fn run(self: Arc<Self>) {
        let config = self.store.gc_config().clone();
        info!(
            "Starting garbage collector with interval: {:?}, prune every {:?}",
            config.interval,
            config.prune_interval()
        );

        let mut interval = time::interval(config.interval);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    info!("Garbage collector stopped");
                    break;
                }
                _ = interval.tick() => {}
            }

            match self.collect_once().await {
                Ok(result) => {
                    if result.has_deletions() {
                        info!("Garbage collection completed: {}", result.summary());
                    }
                    for error in &result.errors {
                        error!("GC error: {}", error);
                    }
                }
                Err(e) => {
                    error!("Garbage collection cycle failed: {}", e);
                }
            }

            if self.prune_scheduler.should_run() && !self.token.is_cancelled() {
                let report = self.store.prune(self.reporter.as_ref()).await;
                self.statistics.lock().record_prune(report.orphans_removed);
            }
        }
    }

    /// Runs one collection cycle and folds it into the statistics.
    pub async fn collect_once(&self) -> Result<GarbageCollectionInfo, BinaryStoreError> {
        let result = self
            .store
            .garbage_collect(
                Arc::clone(&self.resolver),
                &self.token,
                self.reporter.as_ref(),
            )
            .await;

        let mut statistics = self.statistics.lock();
        match &result {
            Ok(info) => statistics.update(info),
            Err(_) => statistics.record_failure(),
        }
        drop(statistics);

        result
    }
}
