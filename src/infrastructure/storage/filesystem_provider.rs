use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::ports::{
    BinaryProvider, BlobReader, LocalBinary, LocalStore, StorageError, WriteReceipt,
};
use crate::application::usage::UsageTracker;
use crate::domain::value_objects::ContentHash;
use crate::infrastructure::storage::{ContentHasher, PathBuilder};

/// How often a writer retries protecting a hash whose deletion is running
const PROTECT_ATTEMPTS: u32 = 100;
const PROTECT_DELAY: Duration = Duration::from_millis(20);

/// Local filesystem provider.
///
/// Layout below the root:
/// - `temp/{uuid}`: uploads in flight
/// - `sha256/{hh}/{hash}`: stored content, sharded by the first two hex chars
pub struct FilesystemProvider {
    path_builder: PathBuilder,
    durable_writes: bool,
    usage: Arc<UsageTracker>,
    next: Arc<dyn BinaryProvider>,
    created_dirs: Arc<RwLock<HashSet<PathBuf>>>,
}

impl FilesystemProvider {
    pub fn new(root: PathBuf, usage: Arc<UsageTracker>, next: Arc<dyn BinaryProvider>) -> Self {
        Self::with_durability(root, true, usage, next)
    }

    pub fn with_durability(
        root: PathBuf,
        durable_writes: bool,
        usage: Arc<UsageTracker>,
        next: Arc<dyn BinaryProvider>,
    ) -> Self {
        Self {
            path_builder: PathBuilder::new(root),
            durable_writes,
            usage,
            next,
            created_dirs: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.path_builder.root()
    }

    /// Initialize storage directories
    pub async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.path_builder.temp_root()).await?;

        // Pre-create all 256 hex prefix directories to avoid doing it on every write
        let content_root = self.path_builder.content_root();
        for i in 0..=255 {
            let shard = content_root.join(format!("{:02x}", i));
            fs::create_dir_all(&shard).await?;
            self.created_dirs.write().insert(shard);
        }

        Ok(())
    }

    async fn ensure_parent(&self, path: &std::path::Path) -> Result<(), StorageError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };

        if self.created_dirs.read().contains(parent) {
            return Ok(());
        }

        fs::create_dir_all(parent).await?;
        self.created_dirs.write().insert(parent.to_path_buf());
        Ok(())
    }

    async fn sync_parent(&self, path: &std::path::Path) {
        if !self.durable_writes {
            return;
        }
        if let Some(parent) = path.parent() {
            match File::open(parent).await {
                Ok(parent_file) => {
                    if let Err(e) = parent_file.sync_all().await {
                        // Sync failed, but file is already renamed - log but don't fail
                        warn!("Failed to sync parent directory after rename: {}", e);
                    }
                }
                Err(e) => warn!("Failed to open parent directory for sync: {}", e),
            }
        }
    }

    async fn local_length(&self, hash: &ContentHash) -> Option<u64> {
        fs::metadata(self.path_builder.final_path(hash))
            .await
            .ok()
            .map(|m| m.len())
    }
}

#[async_trait]
impl BinaryProvider for FilesystemProvider {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn next(&self) -> Option<Arc<dyn BinaryProvider>> {
        Some(Arc::clone(&self.next))
    }

    async fn exists(&self, hash: &ContentHash, expected_length: u64) -> Result<bool, StorageError> {
        match self.local_length(hash).await {
            Some(length) if length == expected_length => Ok(true),
            Some(length) => {
                warn!(
                    hash = %hash,
                    expected_length,
                    actual_length = length,
                    "Stored file length differs from expected length"
                );
                Ok(false)
            }
            None => self.next.exists(hash, expected_length).await,
        }
    }

    async fn read(&self, hash: &ContentHash) -> Result<BlobReader, StorageError> {
        let path = self.path_builder.final_path(hash);

        match File::open(&path).await {
            Ok(file) => Ok(Box::pin(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.next.read(hash).await,
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, reader: BlobReader) -> Result<WriteReceipt, StorageError> {
        // 1. Write to temp file and compute hashes
        let temp_path = self.path_builder.temp_path(Uuid::new_v4());
        debug!("Writing binary to temp file: {:?}", temp_path);
        self.ensure_parent(&temp_path).await?;

        let info =
            match ContentHasher::write_and_hash(&temp_path, reader, self.durable_writes).await {
                Ok(info) => info,
                Err(e) => {
                    warn!("Failed to write binary to temp file {:?}: {}", temp_path, e);
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e);
                }
            };
        let hash = info.primary_hash().clone();

        // 2. Protect the hash before the file becomes visible
        let guard = match self
            .usage
            .protect_with_retry(&hash, PROTECT_ATTEMPTS, PROTECT_DELAY)
            .await
        {
            Some(guard) => guard,
            None => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::Unavailable(format!(
                    "deletion of {} still in progress",
                    hash
                )));
            }
        };

        // 3. Move to final content-addressable location (atomic)
        let final_path = self.path_builder.final_path(&hash);
        if let Err(e) = self.ensure_parent(&final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if fs::metadata(&final_path).await.is_ok() {
            // First writer wins, identical bytes by construction
            debug!("Binary already exists (deduplication): {}", hash);
            let _ = fs::remove_file(&temp_path).await;
            return Ok(WriteReceipt::new(info, Some(guard)));
        }

        debug!("Moving binary to final location: {:?}", final_path);
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            // Concurrent writer may hold the name on some filesystems
            if fs::metadata(&final_path).await.is_ok() {
                debug!("Concurrent writer stored {} first: {}", hash, e);
                return Ok(WriteReceipt::new(info, Some(guard)));
            }
            return Err(StorageError::Io(e));
        }

        self.sync_parent(&final_path).await;
        Ok(WriteReceipt::new(info, Some(guard)))
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        let mut deleted = false;

        if self.usage.usage(hash) > 0 {
            warn!(hash = %hash, "Refusing to delete binary in active use");
        } else {
            match fs::remove_file(self.path_builder.final_path(hash)).await {
                Ok(()) => deleted = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }

        let deleted_downstream = self.next.delete(hash).await?;
        Ok(deleted || deleted_downstream)
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        let probe = self
            .path_builder
            .temp_root()
            .join(format!(".health-{}", Uuid::new_v4()));

        let result = async {
            fs::create_dir_all(self.path_builder.temp_root()).await?;
            fs::write(&probe, b"ok").await?;
            fs::remove_file(&probe).await
        }
        .await;

        if let Err(e) = result {
            return Err(StorageError::Unavailable(format!(
                "{} is not writable: {}",
                self.path_builder.root().display(),
                e
            )));
        }

        self.next.check_health().await
    }

    fn local_store(&self) -> Option<&dyn LocalStore> {
        Some(self)
    }
}

#[async_trait]
impl LocalStore for FilesystemProvider {
    fn location(&self) -> String {
        self.path_builder.root().display().to_string()
    }

    async fn list_local(&self) -> Result<Vec<LocalBinary>, StorageError> {
        let mut found = Vec::new();
        let content_root = self.path_builder.content_root();

        let mut shards = match fs::read_dir(&content_root).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = file.file_name().to_string_lossy().to_string();
                match ContentHash::from_hex(name.as_str()) {
                    Ok(hash) => {
                        let length = file.metadata().await?.len();
                        found.push(LocalBinary { hash, length });
                    }
                    Err(_) => debug!("Ignoring foreign file in content tree: {:?}", file.path()),
                }
            }
        }

        Ok(found)
    }

    async fn remove_local(&self, hash: &ContentHash) -> Result<u64, StorageError> {
        let path = self.path_builder.final_path(hash);
        let length = match fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::Io(e)),
        };

        match fs::remove_file(&path).await {
            Ok(()) => Ok(length),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn remove_stale_temp(&self, max_age: Duration) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut entries = match fs::read_dir(self.path_builder.temp_root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let now = SystemTime::now();
        while let Some(entry) = entries.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age && fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }
}
