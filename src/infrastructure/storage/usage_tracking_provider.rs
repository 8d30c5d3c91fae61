use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::debug;

use crate::application::ports::{BinaryProvider, BlobReader, StorageError, WriteReceipt};
use crate::application::usage::{UsageGuard, UsageTracker};
use crate::domain::value_objects::ContentHash;

/// Head link of the chain: every read stream holds a usage count on its hash
/// until the stream is dropped.
pub struct UsageTrackingProvider {
    usage: Arc<UsageTracker>,
    next: Arc<dyn BinaryProvider>,
}

impl UsageTrackingProvider {
    pub fn new(usage: Arc<UsageTracker>, next: Arc<dyn BinaryProvider>) -> Self {
        Self { usage, next }
    }
}

#[async_trait]
impl BinaryProvider for UsageTrackingProvider {
    fn name(&self) -> &'static str {
        "usage-tracking"
    }

    fn next(&self) -> Option<Arc<dyn BinaryProvider>> {
        Some(Arc::clone(&self.next))
    }

    async fn exists(&self, hash: &ContentHash, expected_length: u64) -> Result<bool, StorageError> {
        self.next.exists(hash, expected_length).await
    }

    async fn read(&self, hash: &ContentHash) -> Result<BlobReader, StorageError> {
        let guard = match self.usage.protect(hash) {
            Some(guard) => guard,
            None => {
                debug!(hash = %hash, "Read refused, binary is being deleted");
                return Err(StorageError::NotFound(hash.to_string()));
            }
        };

        // On error the guard drops here and releases the count
        let inner = self.next.read(hash).await?;
        Ok(Box::pin(UsageGuardedReader::new(inner, guard)))
    }

    async fn write(&self, reader: BlobReader) -> Result<WriteReceipt, StorageError> {
        self.next.write(reader).await
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        self.next.delete(hash).await
    }
}

/// Stream wrapper releasing its usage count exactly once, when dropped
pub struct UsageGuardedReader {
    inner: BlobReader,
    guard: UsageGuard,
}

impl UsageGuardedReader {
    pub fn new(inner: BlobReader, guard: UsageGuard) -> Self {
        Self { inner, guard }
    }

    pub fn hash(&self) -> &ContentHash {
        self.guard.hash()
    }
}

impl AsyncRead for UsageGuardedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.get_mut().inner.as_mut().poll_read(cx, buf)
    }
}
