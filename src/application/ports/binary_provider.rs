use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::application::usage::UsageGuard;
use crate::domain::value_objects::{BinaryInfo, ContentHash};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary not found: {0}")]
    NotFound(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Type alias for async reader
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Outcome of a physical write.
///
/// When the provider protected the hash in the usage table before making the
/// bytes visible, it hands the guard over here. The caller keeps it alive until
/// the catalog row is committed so prune cannot reclaim the fresh file.
pub struct WriteReceipt {
    pub info: BinaryInfo,
    pub guard: Option<UsageGuard>,
}

impl WriteReceipt {
    pub fn new(info: BinaryInfo, guard: Option<UsageGuard>) -> Self {
        Self { info, guard }
    }
}

impl std::fmt::Debug for WriteReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteReceipt")
            .field("info", &self.info)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// A binary found while enumerating a provider's own medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBinary {
    pub hash: ContentHash,
    pub length: u64,
}

/// One link of the provider chain.
///
/// Every operation a link cannot satisfy locally is forwarded to `next()`.
/// The chain always ends with the empty provider, so links never need a
/// "no successor" special case for the data operations.
#[async_trait]
pub trait BinaryProvider: Send + Sync {
    /// Short name used in logs and health reports
    fn name(&self) -> &'static str;

    /// Successor link, `None` only for the terminal link
    fn next(&self) -> Option<Arc<dyn BinaryProvider>>;

    /// Check whether the bytes of `hash` are present with the expected length
    async fn exists(&self, hash: &ContentHash, expected_length: u64)
        -> Result<bool, StorageError>;

    /// Open the content for reading
    async fn read(&self, hash: &ContentHash) -> Result<BlobReader, StorageError>;

    /// Store a stream; hashes are computed while the bytes are written
    async fn write(&self, reader: BlobReader) -> Result<WriteReceipt, StorageError>;

    /// Remove the bytes, returning whether anything was deleted
    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError>;

    /// Verify the medium is reachable and writable
    async fn check_health(&self) -> Result<(), StorageError> {
        match self.next() {
            Some(next) => next.check_health().await,
            None => Ok(()),
        }
    }

    /// Enumeration capability, for providers that own a listable medium
    fn local_store(&self) -> Option<&dyn LocalStore> {
        None
    }
}

/// Enumeration and provider-local removal, used by prune
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Human readable location (directory, table)
    fn location(&self) -> String;

    /// Every binary physically present on this medium
    async fn list_local(&self) -> Result<Vec<LocalBinary>, StorageError>;

    /// Remove the local copy only, returning the bytes freed
    async fn remove_local(&self, hash: &ContentHash) -> Result<u64, StorageError>;

    /// Drop upload leftovers older than `max_age`, returning how many went
    async fn remove_stale_temp(&self, _max_age: Duration) -> Result<usize, StorageError> {
        Ok(0)
    }
}
