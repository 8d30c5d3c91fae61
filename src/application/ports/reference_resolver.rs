use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::collections::HashSet;
use thiserror::Error;

use crate::domain::value_objects::ContentHash;

#[derive(Debug, Error)]
#[error("Reference resolver failed: {0}")]
pub struct ResolverError(pub String);

/// Answers "is this binary still referenced?" on behalf of the rest of the
/// application (artifact tree, metadata, search index).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Return the subset of `hashes` that is still referenced
    async fn referenced(&self, hashes: &[ContentHash])
        -> Result<HashSet<ContentHash>, ResolverError>;

    /// Remove secondary records keyed by this hash (derived index entries and
    /// the like). Called by the garbage collector before the catalog row goes.
    async fn delete_dependents(&self, hash: &ContentHash) -> Result<u64, ResolverError>;
}

/// Resolver backed by an explicit set of referenced hashes.
///
/// Everything outside the set counts as garbage. Used by the admin CLI and
/// by embedders that track references themselves.
#[derive(Debug, Default)]
pub struct ReferenceSet {
    referenced: parking_lot::RwLock<HashSet<ContentHash>>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: ContentHash) -> bool {
        self.referenced.write().insert(hash)
    }

    pub fn remove(&self, hash: &ContentHash) -> bool {
        self.referenced.write().remove(hash)
    }

    pub fn len(&self) -> usize {
        self.referenced.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.referenced.read().is_empty()
    }
}

impl FromIterator<ContentHash> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = ContentHash>>(iter: I) -> Self {
        Self {
            referenced: parking_lot::RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ReferenceResolver for ReferenceSet {
    async fn referenced(
        &self,
        hashes: &[ContentHash],
    ) -> Result<HashSet<ContentHash>, ResolverError> {
        let referenced = self.referenced.read();
        Ok(hashes
            .iter()
            .filter(|hash| referenced.contains(*hash))
            .cloned()
            .collect())
    }

    async fn delete_dependents(&self, _hash: &ContentHash) -> Result<u64, ResolverError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reference_set_filters_to_members() {
        let kept = ContentHash::from_hex("a".repeat(64)).unwrap();
        let dropped = ContentHash::from_hex("b".repeat(64)).unwrap();
        let set: ReferenceSet = [kept.clone()].into_iter().collect();

        let referenced = set
            .referenced(&[kept.clone(), dropped.clone()])
            .await
            .unwrap();
        assert!(referenced.contains(&kept));
        assert!(!referenced.contains(&dropped));

        assert!(set.remove(&kept));
        assert!(set.is_empty());
    }
}
