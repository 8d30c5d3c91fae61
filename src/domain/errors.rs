use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid content hash: expected {expected}, got {actual}")]
    InvalidContentHash { expected: String, actual: String },

    #[error("Binary info mismatch for {hash}: expected {expected}, got {actual}")]
    BinaryInfoMismatch {
        hash: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid external store mode: {0}")]
    InvalidExternalMode(String),

    #[error("Invalid provider kind: {0}")]
    InvalidProviderKind(String),
}
