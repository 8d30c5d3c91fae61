use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::application::ports::{BinaryProvider, BlobReader, StorageError, WriteReceipt};
use crate::domain::entities::BinaryRecord;
use crate::domain::value_objects::{ContentHash, ExternalMode};
use crate::infrastructure::storage::ExternalFilestoreProvider;

/// What happened to one record while connecting or disconnecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The internal store already holds the content
    AlreadyLocal,
    /// Served from the external store in place
    Linked,
    /// Copied into the internal store, external file kept
    Copied(u64),
    /// Copied into the internal store, external file removed
    Moved(u64),
    /// Neither store has the content
    Missing,
}

/// Fronts an external filestore and applies the configured [`ExternalMode`].
///
/// `adopt_into` is a standalone instance of the internal physical provider
/// (ending in the empty provider), so adopted content lands where regular
/// writes land without looping back through this link.
pub struct ExternalWrapperProvider {
    mode: ExternalMode,
    external: Arc<ExternalFilestoreProvider>,
    adopt_into: Arc<dyn BinaryProvider>,
}

impl ExternalWrapperProvider {
    pub fn new(
        mode: ExternalMode,
        external: Arc<ExternalFilestoreProvider>,
        adopt_into: Arc<dyn BinaryProvider>,
    ) -> Self {
        Self {
            mode,
            external,
            adopt_into,
        }
    }

    pub fn mode(&self) -> ExternalMode {
        self.mode
    }

    pub fn external(&self) -> &Arc<ExternalFilestoreProvider> {
        &self.external
    }

    /// Copy external content into the internal store, verifying the hash
    async fn copy_inward(&self, hash: &ContentHash) -> Result<u64, StorageError> {
        let reader = self.external.read(hash).await?;
        let receipt = self.adopt_into.write(reader).await?;

        if receipt.info.primary_hash() != hash {
            error!(
                expected = %hash,
                actual = %receipt.info.primary_hash(),
                "External file content does not match its name"
            );
            return Err(StorageError::Internal(format!(
                "external copy of {} is corrupt",
                hash
            )));
        }

        Ok(receipt.info.length())
    }

    async fn transfer(&self, hash: &ContentHash, evict: bool) -> Result<u64, StorageError> {
        let length = self.copy_inward(hash).await?;
        if evict {
            self.external.evict(hash).await?;
        }
        Ok(length)
    }

    /// Apply the mode to one cataloged binary (attach)
    pub async fn connect(&self, record: &BinaryRecord) -> Result<TransferOutcome, StorageError> {
        let hash = record.primary_hash();
        let length = record.length();

        if self.mode == ExternalMode::Passthrough {
            return Ok(if self.adopt_into.exists(hash, length).await? {
                TransferOutcome::AlreadyLocal
            } else if self.external.exists(hash, length).await? {
                TransferOutcome::Linked
            } else {
                TransferOutcome::Missing
            });
        }

        let evict = self.mode == ExternalMode::Evict;
        if self.adopt_into.exists(hash, length).await? {
            if evict {
                self.external.evict(hash).await?;
            }
            return Ok(TransferOutcome::AlreadyLocal);
        }

        if !self.external.exists(hash, length).await? {
            return Ok(TransferOutcome::Missing);
        }

        let copied = self.transfer(hash, evict).await?;
        Ok(if evict {
            TransferOutcome::Moved(copied)
        } else {
            TransferOutcome::Copied(copied)
        })
    }

    /// Pull content that only exists externally into the internal store (detach)
    pub async fn disconnect(&self, record: &BinaryRecord) -> Result<TransferOutcome, StorageError> {
        let hash = record.primary_hash();
        let length = record.length();

        if self.adopt_into.exists(hash, length).await? {
            return Ok(TransferOutcome::AlreadyLocal);
        }
        if !self.external.exists(hash, length).await? {
            return Ok(TransferOutcome::Missing);
        }

        let copied = self.copy_inward(hash).await?;
        Ok(TransferOutcome::Copied(copied))
    }
}

#[async_trait]
impl BinaryProvider for ExternalWrapperProvider {
    fn name(&self) -> &'static str {
        "external-wrapper"
    }

    fn next(&self) -> Option<Arc<dyn BinaryProvider>> {
        let next: Arc<dyn BinaryProvider> = self.external.clone();
        Some(next)
    }

    async fn exists(&self, hash: &ContentHash, expected_length: u64) -> Result<bool, StorageError> {
        self.external.exists(hash, expected_length).await
    }

    async fn read(&self, hash: &ContentHash) -> Result<BlobReader, StorageError> {
        match self.mode {
            ExternalMode::Passthrough => self.external.read(hash).await,
            ExternalMode::Adopt | ExternalMode::Evict => {
                let evict = self.mode == ExternalMode::Evict;
                match self.transfer(hash, evict).await {
                    Ok(length) => info!(
                        hash = %hash,
                        length,
                        mode = %self.mode,
                        "Adopted binary from external store"
                    ),
                    // A concurrent reader may have moved it inward already
                    Err(StorageError::NotFound(_)) => {
                        debug!(hash = %hash, "No external copy, reading adopted content");
                    }
                    Err(e) => return Err(e),
                }
                self.adopt_into.read(hash).await
            }
        }
    }

    async fn write(&self, reader: BlobReader) -> Result<WriteReceipt, StorageError> {
        debug!("Write reached the external wrapper, forwarding");
        self.external.write(reader).await
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        self.external.delete(hash).await
    }
}
