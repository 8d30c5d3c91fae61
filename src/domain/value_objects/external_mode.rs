use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// How an attached external filestore cooperates with the internal store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExternalMode {
    /// Serve from the external store, never copy
    #[default]
    Passthrough,
    /// Copy into the internal store on first read
    Adopt,
    /// Copy into the internal store and remove the external file
    Evict,
}

impl std::fmt::Display for ExternalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalMode::Passthrough => write!(f, "passthrough"),
            ExternalMode::Adopt => write!(f, "adopt"),
            ExternalMode::Evict => write!(f, "evict"),
        }
    }
}

impl std::str::FromStr for ExternalMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passthrough" => Ok(ExternalMode::Passthrough),
            "adopt" | "copy" => Ok(ExternalMode::Adopt),
            "evict" | "move" => Ok(ExternalMode::Evict),
            _ => Err(DomainError::InvalidExternalMode(s.to_string())),
        }
    }
}

/// Physical medium backing the internal store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Sharded directory tree on the local filesystem
    #[default]
    Filesystem,
    /// BLOB column in the catalog database
    Blob,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Filesystem => write!(f, "filesystem"),
            ProviderKind::Blob => write!(f, "blob"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filesystem" | "file" => Ok(ProviderKind::Filesystem),
            "blob" | "database" => Ok(ProviderKind::Blob),
            _ => Err(DomainError::InvalidProviderKind(s.to_string())),
        }
    }
}
