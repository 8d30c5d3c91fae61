use serde::{Deserialize, Serialize};

use super::ContentHash;
use crate::domain::errors::DomainError;

/// Immutable description of a stored binary.
///
/// Identity is the primary hash alone. The secondary hash (BLAKE3) and the
/// length are integrity cross-checks: two infos with the same primary hash
/// that disagree on either one describe a collision or corruption, never a
/// duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryInfo {
    primary_hash: ContentHash,
    secondary_hash: String,
    length: u64,
}

impl BinaryInfo {
    pub fn new(primary_hash: ContentHash, secondary_hash: impl Into<String>, length: u64) -> Self {
        Self {
            primary_hash,
            secondary_hash: secondary_hash.into().to_lowercase(),
            length,
        }
    }

    pub fn primary_hash(&self) -> &ContentHash {
        &self.primary_hash
    }

    pub fn secondary_hash(&self) -> &str {
        &self.secondary_hash
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Cross-check another description of the same primary hash.
    pub fn verify_same(&self, other: &BinaryInfo) -> Result<(), DomainError> {
        if self.primary_hash != other.primary_hash {
            return Err(DomainError::BinaryInfoMismatch {
                hash: self.primary_hash.to_string(),
                expected: format!("primary hash {}", self.primary_hash),
                actual: format!("primary hash {}", other.primary_hash),
            });
        }

        if self.length != other.length {
            return Err(DomainError::BinaryInfoMismatch {
                hash: self.primary_hash.to_string(),
                expected: format!("length {}", self.length),
                actual: format!("length {}", other.length),
            });
        }

        if self.secondary_hash != other.secondary_hash {
            return Err(DomainError::BinaryInfoMismatch {
                hash: self.primary_hash.to_string(),
                expected: format!("secondary hash {}", self.secondary_hash),
                actual: format!("secondary hash {}", other.secondary_hash),
            });
        }

        Ok(())
    }
}

impl std::fmt::Display for BinaryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.primary_hash, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(c: char) -> ContentHash {
        ContentHash::from_hex(c.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn test_verify_same_accepts_identical() {
        let a = BinaryInfo::new(hash('a'), "ff00", 5);
        let b = BinaryInfo::new(hash('a'), "FF00", 5);
        assert!(a.verify_same(&b).is_ok());
    }

    #[test]
    fn test_verify_same_rejects_length_mismatch() {
        let a = BinaryInfo::new(hash('a'), "ff00", 5);
        let b = BinaryInfo::new(hash('a'), "ff00", 6);
        let err = a.verify_same(&b).unwrap_err();
        assert!(err.to_string().contains("length 5"));
    }

    #[test]
    fn test_verify_same_rejects_secondary_mismatch() {
        let a = BinaryInfo::new(hash('a'), "ff00", 5);
        let b = BinaryInfo::new(hash('a'), "ff01", 5);
        assert!(matches!(
            a.verify_same(&b),
            Err(DomainError::BinaryInfoMismatch { .. })
        ));
    }
}
