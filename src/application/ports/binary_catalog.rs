use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::ReferenceResolver;
use crate::domain::entities::{BinaryRecord, CatalogStats};
use crate::domain::value_objects::{BinaryInfo, ContentHash};

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Another writer already cataloged this primary hash
    #[error("Duplicate catalog entry: {0}")]
    DuplicateKey(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt catalog row: {0}")]
    Corrupt(String),

    #[error("Reference resolver error: {0}")]
    Resolver(String),
}

impl CatalogError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, CatalogError::DuplicateKey(_))
    }
}

/// Port for the persistent index of stored binaries
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BinaryCatalog: Send + Sync {
    /// Create the catalog schema if it does not exist yet
    async fn init(&self) -> Result<(), CatalogError>;

    /// Check whether a primary hash is cataloged
    async fn exists(&self, hash: &ContentHash) -> Result<bool, CatalogError>;

    /// Load a single record
    async fn load(&self, hash: &ContentHash) -> Result<Option<BinaryRecord>, CatalogError>;

    /// Insert a new record.
    ///
    /// A unique-key violation must be reported as [`CatalogError::DuplicateKey`].
    async fn create(&self, info: &BinaryInfo) -> Result<BinaryRecord, CatalogError>;

    /// Delete a record, returning whether a row was removed
    async fn delete(&self, hash: &ContentHash) -> Result<bool, CatalogError>;

    /// Bulk lookup; unknown hashes are simply absent from the result
    async fn search(&self, hashes: &[ContentHash]) -> Result<Vec<BinaryRecord>, CatalogError>;

    /// All records, ordered by primary hash
    async fn find_all(&self) -> Result<Vec<BinaryRecord>, CatalogError>;

    /// Number of records and sum of their lengths
    async fn count_and_size(&self) -> Result<CatalogStats, CatalogError>;

    /// Records the rest of the application no longer references.
    ///
    /// The resolver is the ground truth for "still referenced". Records younger
    /// than `min_age` are never returned.
    async fn find_deletion_candidates(
        &self,
        resolver: Arc<dyn ReferenceResolver>,
        min_age: Duration,
    ) -> Result<Vec<BinaryRecord>, CatalogError>;
}
