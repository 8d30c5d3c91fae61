use parking_lot::RwLock;
use sqlx::AnyPool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::application::ports::{BinaryProvider, StorageError};
use crate::application::usage::UsageTracker;
use crate::domain::value_objects::ExternalMode;
use crate::infrastructure::persistence::SqlDialect;
use crate::infrastructure::storage::{
    BlobProvider, EmptyProvider, ExternalFilestoreProvider, ExternalWrapperProvider,
    FilesystemProvider, UsageTrackingProvider,
};

/// Physical store receiving all writes
#[derive(Clone)]
pub enum InternalStore {
    Filesystem { root: PathBuf, durable_writes: bool },
    Blob { pool: AnyPool, dialect: SqlDialect },
}

impl InternalStore {
    fn build(&self, usage: &Arc<UsageTracker>, next: Arc<dyn BinaryProvider>) -> InternalLink {
        match self {
            InternalStore::Filesystem {
                root,
                durable_writes,
            } => InternalLink::Filesystem(Arc::new(FilesystemProvider::with_durability(
                root.clone(),
                *durable_writes,
                Arc::clone(usage),
                next,
            ))),
            InternalStore::Blob { pool, dialect } => InternalLink::Blob(Arc::new(
                BlobProvider::new(pool.clone(), *dialect, Arc::clone(usage), next),
            )),
        }
    }
}

impl std::fmt::Debug for InternalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InternalStore::Filesystem {
                root,
                durable_writes,
            } => f
                .debug_struct("Filesystem")
                .field("root", root)
                .field("durable_writes", durable_writes)
                .finish(),
            InternalStore::Blob { dialect, .. } => {
                f.debug_struct("Blob").field("dialect", dialect).finish()
            }
        }
    }
}

/// Legacy filestore fronted by the wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalStoreConfig {
    pub root: PathBuf,
    pub mode: ExternalMode,
}

impl ExternalStoreConfig {
    pub fn new(root: impl Into<PathBuf>, mode: ExternalMode) -> Self {
        Self {
            root: root.into(),
            mode,
        }
    }
}

#[derive(Clone)]
enum InternalLink {
    Filesystem(Arc<FilesystemProvider>),
    Blob(Arc<BlobProvider>),
}

impl InternalLink {
    fn provider(&self) -> Arc<dyn BinaryProvider> {
        match self {
            InternalLink::Filesystem(p) => p.clone() as Arc<dyn BinaryProvider>,
            InternalLink::Blob(p) => p.clone() as Arc<dyn BinaryProvider>,
        }
    }

    async fn init(&self) -> Result<(), StorageError> {
        match self {
            InternalLink::Filesystem(p) => p.init().await,
            InternalLink::Blob(p) => p.init().await,
        }
    }
}

struct ChainState {
    head: Arc<dyn BinaryProvider>,
    internal: InternalLink,
    external: Option<(ExternalStoreConfig, Arc<ExternalWrapperProvider>)>,
}

/// The assembled provider chain.
///
/// Shape: usage tracking -> internal store -> [external wrapper -> external]
/// -> empty. Topology changes only through [`attach`](Self::attach) and
/// [`detach`](Self::detach), under the state lock; in-flight operations keep
/// the links they already hold.
pub struct ProviderChain {
    usage: Arc<UsageTracker>,
    internal: InternalStore,
    state: RwLock<ChainState>,
}

impl ProviderChain {
    pub fn new(
        usage: Arc<UsageTracker>,
        internal: InternalStore,
        external: Option<ExternalStoreConfig>,
    ) -> Self {
        let state = Self::assemble(&usage, &internal, external);
        Self {
            usage,
            internal,
            state: RwLock::new(state),
        }
    }

    fn assemble(
        usage: &Arc<UsageTracker>,
        internal: &InternalStore,
        external: Option<ExternalStoreConfig>,
    ) -> ChainState {
        let mut tail = EmptyProvider::shared();

        let external = external.map(|config| {
            let filestore = Arc::new(ExternalFilestoreProvider::new(
                config.root.clone(),
                EmptyProvider::shared(),
            ));
            let adopt_into = internal.build(usage, EmptyProvider::shared()).provider();
            let wrapper = Arc::new(ExternalWrapperProvider::new(
                config.mode,
                filestore,
                adopt_into,
            ));
            tail = wrapper.clone() as Arc<dyn BinaryProvider>;
            (config, wrapper)
        });

        let internal = internal.build(usage, tail);
        let head: Arc<dyn BinaryProvider> = Arc::new(UsageTrackingProvider::new(
            Arc::clone(usage),
            internal.provider(),
        ));

        ChainState {
            head,
            internal,
            external,
        }
    }

    /// Create directories or tables of the internal store
    pub async fn init(&self) -> Result<(), StorageError> {
        let internal = self.state.read().internal.clone();
        internal.init().await
    }

    /// Entry point for every data operation
    pub fn head(&self) -> Arc<dyn BinaryProvider> {
        Arc::clone(&self.state.read().head)
    }

    /// Physical store receiving writes
    pub fn internal(&self) -> Arc<dyn BinaryProvider> {
        self.state.read().internal.provider()
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn external(&self) -> Option<(ExternalStoreConfig, Arc<ExternalWrapperProvider>)> {
        self.state.read().external.clone()
    }

    /// Link names from head to tail
    pub fn describe(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut current = Some(self.head());
        while let Some(link) = current {
            names.push(link.name());
            current = link.next();
        }
        names
    }

    /// Insert an external store; fails if one is already attached
    pub fn attach(
        &self,
        config: ExternalStoreConfig,
    ) -> Result<Arc<ExternalWrapperProvider>, StorageError> {
        let mut state = self.state.write();
        if let Some((current, _)) = &state.external {
            return Err(StorageError::Unavailable(format!(
                "external store {} already attached",
                current.root.display()
            )));
        }

        info!(root = %config.root.display(), mode = %config.mode, "Attaching external store");
        *state = Self::assemble(&self.usage, &self.internal, Some(config));

        state
            .external
            .as_ref()
            .map(|(_, wrapper)| Arc::clone(wrapper))
            .ok_or_else(|| StorageError::Internal("external link missing after attach".into()))
    }

    /// Remove the external store from the chain, returning its config
    pub fn detach(&self) -> Option<ExternalStoreConfig> {
        let mut state = self.state.write();
        let (config, _) = state.external.take()?;

        info!(root = %config.root.display(), "Detaching external store");
        *state = Self::assemble(&self.usage, &self.internal, None);
        Some(config)
    }
}
