use std::path::{Path, PathBuf};

use crate::domain::value_objects::ContentHash;

/// Name of the sharded content directory below a provider root
pub const CONTENT_DIR: &str = "sha256";

/// Name of the temporary upload directory below a provider root
pub const TEMP_DIR: &str = "temp";

/// Utility for generating storage paths
#[derive(Debug, Clone)]
pub struct PathBuilder {
    root: PathBuf,
}

impl PathBuilder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all shards: /root/sha256
    pub fn content_root(&self) -> PathBuf {
        self.root.join(CONTENT_DIR)
    }

    /// Directory for in-flight uploads: /root/temp
    pub fn temp_root(&self) -> PathBuf {
        self.root.join(TEMP_DIR)
    }

    /// Generate temp upload path: /root/temp/{uuid}
    pub fn temp_path(&self, id: uuid::Uuid) -> PathBuf {
        self.temp_root().join(id.to_string())
    }

    /// Generate final content-addressable path: /root/sha256/{prefix}/{hash}
    pub fn final_path(&self, hash: &ContentHash) -> PathBuf {
        self.content_root().join(hash.prefix()).join(hash.as_hex())
    }
}
