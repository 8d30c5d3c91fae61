use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::application::ports::StorageError;
use crate::domain::value_objects::{BinaryInfo, ContentHash};

/// Buffer size for I/O operations. 256KB provides optimal throughput
/// for most modern storage systems while balancing memory usage.
const BUFFER_SIZE: usize = 256 * 1024;

/// Incremental digest state: SHA-256 primary, BLAKE3 secondary, byte count
struct DualDigest {
    primary: Sha256,
    secondary: blake3::Hasher,
    length: u64,
}

impl DualDigest {
    fn new() -> Self {
        Self {
            primary: Sha256::new(),
            secondary: blake3::Hasher::new(),
            length: 0,
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        self.primary.update(chunk);
        self.secondary.update(chunk);
        self.length += chunk.len() as u64;
    }

    fn finish(self) -> Result<BinaryInfo, StorageError> {
        let primary = ContentHash::from_digest(&self.primary.finalize())
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let secondary = self.secondary.finalize().to_hex().to_string();
        Ok(BinaryInfo::new(primary, secondary, self.length))
    }
}

/// Utility computing the primary and secondary digests of content.
///
/// Both digests and the length are computed while the bytes stream through,
/// so a payload is never read twice.
pub struct ContentHasher;

impl ContentHasher {
    /// Write stream to file and compute the binary info simultaneously.
    ///
    /// # Arguments
    ///
    /// * `dest_path` - Path where the file will be written
    /// * `reader` - Async reader providing the data to hash and write
    /// * `durable` - If `true`, performs `fsync()` to ensure data is on disk
    pub async fn write_and_hash(
        dest_path: &Path,
        mut reader: impl AsyncRead + Unpin,
        durable: bool,
    ) -> Result<BinaryInfo, StorageError> {
        // Using 2x buffer size for BufWriter to minimize syscalls
        let mut file =
            tokio::io::BufWriter::with_capacity(BUFFER_SIZE * 2, File::create(dest_path).await?);

        let mut digest = DualDigest::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            digest.update(&buffer[..n]);
            file.write_all(&buffer[..n]).await?;
        }

        file.flush().await?;

        if durable {
            file.get_mut().sync_all().await?;
        }

        digest.finish()
    }

    /// Read a whole stream into memory, hashing it on the way.
    ///
    /// Used by providers that cannot stream into their medium (BLOB columns).
    pub async fn buffer_and_hash(
        mut reader: impl AsyncRead + Unpin,
    ) -> Result<(BinaryInfo, Bytes), StorageError> {
        let mut digest = DualDigest::new();
        let mut data = BytesMut::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            digest.update(&buffer[..n]);
            data.extend_from_slice(&buffer[..n]);
        }

        Ok((digest.finish()?, data.freeze()))
    }

    /// Binary info of an in-memory payload
    pub fn hash_bytes(data: &[u8]) -> Result<BinaryInfo, StorageError> {
        let mut digest = DualDigest::new();
        digest.update(data);
        digest.finish()
    }
}
