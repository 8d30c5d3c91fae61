use async_trait::async_trait;
use sqlx::AnyPool;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::ports::{
    BinaryProvider, BlobReader, LocalBinary, LocalStore, StorageError, WriteReceipt,
};
use crate::application::usage::UsageTracker;
use crate::domain::value_objects::ContentHash;
use crate::infrastructure::persistence::{is_unique_violation, SqlDialect};
use crate::infrastructure::storage::ContentHasher;

const PROTECT_ATTEMPTS: u32 = 100;
const PROTECT_DELAY: Duration = Duration::from_millis(20);

/// Stores content in a database BLOB column, one row per primary hash
pub struct BlobProvider {
    pool: AnyPool,
    dialect: SqlDialect,
    usage: Arc<UsageTracker>,
    next: Arc<dyn BinaryProvider>,
}

impl BlobProvider {
    pub fn new(
        pool: AnyPool,
        dialect: SqlDialect,
        usage: Arc<UsageTracker>,
        next: Arc<dyn BinaryProvider>,
    ) -> Self {
        Self {
            pool,
            dialect,
            usage,
            next,
        }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS binary_blobs (
                primary_hash VARCHAR(64) NOT NULL PRIMARY KEY,
                data {} NOT NULL
            )
            "#,
            self.dialect.blob_type()
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn local_length(&self, hash: &ContentHash) -> Result<Option<u64>, StorageError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT CAST(LENGTH(data) AS BIGINT) FROM binary_blobs WHERE primary_hash = $1",
        )
        .bind(hash.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(length,)| length.max(0) as u64))
    }
}

#[async_trait]
impl BinaryProvider for BlobProvider {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn next(&self) -> Option<Arc<dyn BinaryProvider>> {
        Some(Arc::clone(&self.next))
    }

    async fn exists(&self, hash: &ContentHash, expected_length: u64) -> Result<bool, StorageError> {
        match self.local_length(hash).await? {
            Some(length) => Ok(length == expected_length),
            None => self.next.exists(hash, expected_length).await,
        }
    }

    async fn read(&self, hash: &ContentHash) -> Result<BlobReader, StorageError> {
        let row = sqlx::query_as::<_, (Vec<u8>,)>(
            "SELECT data FROM binary_blobs WHERE primary_hash = $1",
        )
        .bind(hash.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((data,)) => Ok(Box::pin(Cursor::new(data))),
            None => self.next.read(hash).await,
        }
    }

    async fn write(&self, reader: BlobReader) -> Result<WriteReceipt, StorageError> {
        let (info, data) = ContentHasher::buffer_and_hash(reader).await?;
        let hash = info.primary_hash().clone();

        let guard = self
            .usage
            .protect_with_retry(&hash, PROTECT_ATTEMPTS, PROTECT_DELAY)
            .await
            .ok_or_else(|| {
                StorageError::Unavailable(format!("deletion of {} still in progress", hash))
            })?;

        let result = sqlx::query("INSERT INTO binary_blobs (primary_hash, data) VALUES ($1, $2)")
            .bind(hash.as_hex())
            .bind(data.to_vec())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {}
            // First writer wins, identical bytes by construction
            Err(e) if is_unique_violation(&e) => {
                debug!("Binary already exists (deduplication): {}", hash)
            }
            Err(e) => return Err(StorageError::Database(e)),
        }

        Ok(WriteReceipt::new(info, Some(guard)))
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        let mut deleted = false;

        if self.usage.usage(hash) > 0 {
            warn!(hash = %hash, "Refusing to delete binary in active use");
        } else {
            let result = sqlx::query("DELETE FROM binary_blobs WHERE primary_hash = $1")
                .bind(hash.as_hex())
                .execute(&self.pool)
                .await?;
            deleted = result.rows_affected() > 0;
        }

        let deleted_downstream = self.next.delete(hash).await?;
        Ok(deleted || deleted_downstream)
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query_as::<_, (i64,)>("SELECT CAST(COUNT(*) AS BIGINT) FROM binary_blobs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(format!("binary_blobs: {}", e)))?;

        self.next.check_health().await
    }

    fn local_store(&self) -> Option<&dyn LocalStore> {
        Some(self)
    }
}

#[async_trait]
impl LocalStore for BlobProvider {
    fn location(&self) -> String {
        format!("{} table binary_blobs", self.dialect)
    }

    async fn list_local(&self) -> Result<Vec<LocalBinary>, StorageError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT primary_hash, CAST(LENGTH(data) AS BIGINT) FROM binary_blobs",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut found = Vec::with_capacity(rows.len());
        for (hash, length) in rows {
            match ContentHash::from_hex(hash.as_str()) {
                Ok(hash) => found.push(LocalBinary {
                    hash,
                    length: length.max(0) as u64,
                }),
                Err(_) => warn!("Ignoring malformed key in binary_blobs: {}", hash),
            }
        }

        Ok(found)
    }

    async fn remove_local(&self, hash: &ContentHash) -> Result<u64, StorageError> {
        let Some(length) = self.local_length(hash).await? else {
            return Ok(0);
        };

        let result = sqlx::query("DELETE FROM binary_blobs WHERE primary_hash = $1")
            .bind(hash.as_hex())
            .execute(&self.pool)
            .await?;

        Ok(if result.rows_affected() > 0 { length } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connect_in_memory;
    use crate::infrastructure::storage::EmptyProvider;
    use tokio::io::AsyncReadExt;

    async fn provider() -> (BlobProvider, Arc<UsageTracker>) {
        let usage = Arc::new(UsageTracker::new());
        let provider = BlobProvider::new(
            connect_in_memory().await.unwrap(),
            SqlDialect::Sqlite,
            Arc::clone(&usage),
            EmptyProvider::shared(),
        );
        provider.init().await.unwrap();
        (provider, usage)
    }

    #[tokio::test]
    async fn test_write_read_and_exists() {
        let (provider, _) = provider().await;

        let receipt = provider
            .write(Box::pin(Cursor::new(b"blob content".to_vec())))
            .await
            .unwrap();
        let hash = receipt.info.primary_hash().clone();

        assert!(provider.exists(&hash, 12).await.unwrap());
        assert!(!provider.exists(&hash, 11).await.unwrap());

        let mut buffer = Vec::new();
        provider
            .read(&hash)
            .await
            .unwrap()
            .read_to_end(&mut buffer)
            .await
            .unwrap();
        assert_eq!(buffer, b"blob content");
    }

    #[tokio::test]
    async fn test_duplicate_write_is_tolerated() {
        let (provider, _) = provider().await;

        let first = provider
            .write(Box::pin(Cursor::new(b"same".to_vec())))
            .await
            .unwrap()
            .info;
        let second = provider
            .write(Box::pin(Cursor::new(b"same".to_vec())))
            .await
            .unwrap()
            .info;

        assert_eq!(first, second);
        assert_eq!(provider.list_local().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_remove_local() {
        let (provider, usage) = provider().await;
        let info = provider
            .write(Box::pin(Cursor::new(b"doomed".to_vec())))
            .await
            .unwrap()
            .info;
        let hash = info.primary_hash().clone();

        let guard = usage.protect(&hash).unwrap();
        assert!(!provider.delete(&hash).await.unwrap());
        drop(guard);

        assert_eq!(provider.remove_local(&hash).await.unwrap(), 6);
        assert_eq!(provider.remove_local(&hash).await.unwrap(), 0);
        assert!(matches!(
            provider.read(&hash).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (provider, _) = provider().await;
        assert!(provider.check_health().await.is_ok());
    }
}
