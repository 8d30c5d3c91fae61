use std::sync::Arc;

use sqlx::AnyPool;
use tracing::info;

use crate::application::gc::GarbageCollector;
use crate::application::ports::{BinaryCatalog, ReferenceResolver};
use crate::application::store::BinaryStore;
use crate::application::usage::UsageTracker;
use crate::config::Config;
use crate::domain::value_objects::ProviderKind;
use crate::infrastructure::persistence::{connect_pool, SqlBinaryCatalog, SqlDialect};
use crate::infrastructure::storage::{ExternalStoreConfig, InternalStore, ProviderChain};

type BuildError = Box<dyn std::error::Error + Send + Sync>;

/// Assembled store and the pool it runs on
pub struct Application {
    pub config: Config,
    pub pool: AnyPool,
    pub dialect: SqlDialect,
    pub store: Arc<BinaryStore>,
}

impl Application {
    /// Background collector for this store
    pub fn garbage_collector(&self, resolver: Arc<dyn ReferenceResolver>) -> Arc<GarbageCollector> {
        Arc::new(GarbageCollector::new(Arc::clone(&self.store), resolver))
    }
}

/// Application builder for dependency injection and setup
pub struct ApplicationBuilder {
    config: Config,
    pool: Option<(AnyPool, SqlDialect)>,
    catalog: Option<Arc<dyn BinaryCatalog>>,
    chain: Option<Arc<ProviderChain>>,
}

impl ApplicationBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pool: None,
            catalog: None,
            chain: None,
        }
    }

    /// Use an already opened pool instead of connecting
    pub fn with_pool(mut self, pool: AnyPool, dialect: SqlDialect) -> Self {
        self.pool = Some((pool, dialect));
        self
    }

    /// Connect the pool with retries and create the catalog schema
    pub async fn with_database(mut self) -> Result<Self, BuildError> {
        let (pool, dialect) = match self.pool.take() {
            Some(existing) => existing,
            None => {
                info!("Connecting to database: {}", self.config.database_url);
                connect_pool(&self.config.pool_settings()).await?
            }
        };

        info!(
            "Database pool configured: dialect={}, max={}, min={}",
            dialect, self.config.db_max_connections, self.config.db_min_connections
        );

        let catalog = SqlBinaryCatalog::new(pool.clone());
        catalog.init().await?;
        info!("Catalog schema ready");

        self.catalog = Some(Arc::new(catalog));
        self.pool = Some((pool, dialect));
        Ok(self)
    }

    /// Build and initialise the provider chain
    pub async fn with_storage(mut self) -> Result<Self, BuildError> {
        let (pool, dialect) = self
            .pool
            .as_ref()
            .ok_or("Database pool not initialized")?;

        let internal = match self.config.provider {
            ProviderKind::Filesystem => InternalStore::Filesystem {
                root: self.config.root.clone(),
                durable_writes: self.config.durable_writes,
            },
            ProviderKind::Blob => InternalStore::Blob {
                pool: pool.clone(),
                dialect: *dialect,
            },
        };
        let external = self
            .config
            .external_dir
            .clone()
            .map(|root| ExternalStoreConfig::new(root, self.config.external_mode));

        let chain = Arc::new(ProviderChain::new(
            Arc::new(UsageTracker::new()),
            internal,
            external,
        ));
        chain.init().await?;
        info!("Provider chain: {}", chain.describe().join(" -> "));

        self.chain = Some(chain);
        Ok(self)
    }

    pub fn build(self) -> Result<Application, BuildError> {
        let (pool, dialect) = self.pool.ok_or("Database pool not initialized")?;
        let catalog = self.catalog.ok_or("Catalog not initialized")?;
        let chain = self.chain.ok_or("Provider chain not initialized")?;

        let store = Arc::new(BinaryStore::new(catalog, chain, self.config.gc.clone()));
        info!("Binary store initialized");

        Ok(Application {
            config: self.config,
            pool,
            dialect,
            store,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
