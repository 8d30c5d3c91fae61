//! Error type surfaced by the binary store facade

use thiserror::Error;

use crate::application::ports::{CatalogError, StorageError};
use crate::domain::errors::DomainError;
use crate::domain::value_objects::BinaryInfo;

#[derive(Debug, Error)]
pub enum BinaryStoreError {
    /// No provider holds the content
    #[error("Binary not found: {0}")]
    NotFound(String),

    /// Same primary hash, conflicting length or secondary hash
    #[error("Hash mismatch for {hash}: expected {expected}, got {actual}")]
    HashMismatch {
        hash: String,
        expected: String,
        actual: String,
    },

    /// Bytes are stored, only the catalog step failed. Retry with
    /// `add_record(info)`; the payload does not need to be sent again.
    #[error("Catalog insert failed for stored binary {info}: {source}")]
    RetryableInsert {
        info: BinaryInfo,
        #[source]
        source: CatalogError,
    },

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Deletion rights could not be claimed
    #[error("Binary in use: {0}")]
    InUse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl BinaryStoreError {
    /// Whether the caller may retry the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BinaryStoreError::RetryableInsert { .. }
                | BinaryStoreError::ProviderUnavailable(_)
                | BinaryStoreError::InUse(_)
        )
    }

    /// The already computed info of a `RetryableInsert`
    pub fn stored_info(&self) -> Option<&BinaryInfo> {
        match self {
            BinaryStoreError::RetryableInsert { info, .. } => Some(info),
            _ => None,
        }
    }
}

impl From<StorageError> for BinaryStoreError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(hash) => BinaryStoreError::NotFound(hash),
            StorageError::Unavailable(reason) => BinaryStoreError::ProviderUnavailable(reason),
            other => BinaryStoreError::Storage(other),
        }
    }
}

impl From<DomainError> for BinaryStoreError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::BinaryInfoMismatch {
                hash,
                expected,
                actual,
            } => BinaryStoreError::HashMismatch {
                hash,
                expected,
                actual,
            },
            other => BinaryStoreError::InvalidRequest(other.to_string()),
        }
    }
}
