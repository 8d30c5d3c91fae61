use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{BinaryInfo, ContentHash};

/// Catalog record - persisted form of a [`BinaryInfo`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRecord {
    info: BinaryInfo,
    created_at: DateTime<Utc>,
}

impl BinaryRecord {
    /// Create new record stamped with the current time
    pub fn new(info: BinaryInfo) -> Self {
        Self {
            info,
            created_at: Utc::now(),
        }
    }

    /// Reconstruct from storage
    pub fn reconstruct(info: BinaryInfo, created_at: DateTime<Utc>) -> Self {
        Self { info, created_at }
    }

    // Getters
    pub fn info(&self) -> &BinaryInfo {
        &self.info
    }

    pub fn into_info(self) -> BinaryInfo {
        self.info
    }

    pub fn primary_hash(&self) -> &ContentHash {
        self.info.primary_hash()
    }

    pub fn length(&self) -> u64 {
        self.info.length()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Catalog-wide count and byte total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub count: u64,
    pub total_bytes: u64,
}

impl CatalogStats {
    pub fn new(count: u64, total_bytes: u64) -> Self {
        Self { count, total_bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_reconstruct_keeps_timestamp() {
        let hash = ContentHash::from_hex("a".repeat(64)).unwrap();
        let created_at = Utc::now() - Duration::hours(3);
        let record = BinaryRecord::reconstruct(BinaryInfo::new(hash.clone(), "00", 12), created_at);

        assert_eq!(record.primary_hash(), &hash);
        assert_eq!(record.length(), 12);
        assert_eq!(record.created_at(), created_at);
    }
}
