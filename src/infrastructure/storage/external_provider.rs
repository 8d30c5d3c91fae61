use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tracing::{debug, warn};

use crate::application::ports::{BinaryProvider, BlobReader, StorageError, WriteReceipt};
use crate::domain::value_objects::ContentHash;
use crate::infrastructure::storage::PathBuilder;

/// Read-only view of a legacy filestore using the same sharded layout.
///
/// Nothing is ever written here. Files only disappear through [`evict`],
/// which the wrapper calls once content has been moved into the internal
/// store.
///
/// [`evict`]: ExternalFilestoreProvider::evict
pub struct ExternalFilestoreProvider {
    path_builder: PathBuilder,
    next: Arc<dyn BinaryProvider>,
}

impl ExternalFilestoreProvider {
    pub fn new(root: PathBuf, next: Arc<dyn BinaryProvider>) -> Self {
        Self {
            path_builder: PathBuilder::new(root),
            next,
        }
    }

    pub fn root(&self) -> &Path {
        self.path_builder.root()
    }

    /// Length of the external copy, if there is one
    pub async fn local_length(&self, hash: &ContentHash) -> Option<u64> {
        fs::metadata(self.path_builder.final_path(hash))
            .await
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    /// Remove the external copy, returning whether a file was removed
    pub async fn evict(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_builder.final_path(hash)).await {
            Ok(()) => {
                debug!(hash = %hash, "Evicted binary from external store");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl BinaryProvider for ExternalFilestoreProvider {
    fn name(&self) -> &'static str {
        "external"
    }

    fn next(&self) -> Option<Arc<dyn BinaryProvider>> {
        Some(Arc::clone(&self.next))
    }

    async fn exists(&self, hash: &ContentHash, expected_length: u64) -> Result<bool, StorageError> {
        match self.local_length(hash).await {
            Some(length) => Ok(length == expected_length),
            None => self.next.exists(hash, expected_length).await,
        }
    }

    async fn read(&self, hash: &ContentHash) -> Result<BlobReader, StorageError> {
        match File::open(self.path_builder.final_path(hash)).await {
            Ok(file) => Ok(Box::pin(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.next.read(hash).await,
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, reader: BlobReader) -> Result<WriteReceipt, StorageError> {
        self.next.write(reader).await
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        self.next.delete(hash).await
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        match fs::metadata(self.root()).await {
            Ok(metadata) if metadata.is_dir() => self.next.check_health().await,
            Ok(_) => Err(StorageError::Unavailable(format!(
                "external store {} is not a directory",
                self.root().display()
            ))),
            Err(e) => {
                warn!("External store {} unreachable: {}", self.root().display(), e);
                Err(StorageError::Unavailable(format!(
                    "external store {} unreachable: {}",
                    self.root().display(),
                    e
                )))
            }
        }
    }
}
