use async_trait::async_trait;
use std::sync::Arc;

use crate::application::ports::{BinaryProvider, BlobReader, StorageError, WriteReceipt};
use crate::domain::value_objects::ContentHash;

/// Terminal link of every chain: nothing exists, nothing is stored
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyProvider;

impl EmptyProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> Arc<dyn BinaryProvider> {
        Arc::new(Self)
    }
}

#[async_trait]
impl BinaryProvider for EmptyProvider {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn next(&self) -> Option<Arc<dyn BinaryProvider>> {
        None
    }

    async fn exists(
        &self,
        _hash: &ContentHash,
        _expected_length: u64,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn read(&self, hash: &ContentHash) -> Result<BlobReader, StorageError> {
        Err(StorageError::NotFound(hash.to_string()))
    }

    async fn write(&self, _reader: BlobReader) -> Result<WriteReceipt, StorageError> {
        Err(StorageError::Unavailable(
            "no provider in the chain accepts writes".to_string(),
        ))
    }

    async fn delete(&self, _hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
