//! Error types for the Morphos engine
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using MorphosError
pub type Result<T> = std::result::Result<T, MorphosError>;

/// Unified error type for Morphos operations
#[derive(Debug, Error)]
pub enum MorphosError {
    // State store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // Entropy errors
    #[error("Entropy error: {0}")]
    Entropy(#[from] EntropyError),

    // Sweet-spot search errors
    #[error("Sweet-spot search error: {0}")]
    Search(#[from] HesaError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MorphosError {
    /// Whether the caller may simply retry the operation
    pub fn is_retriable(&self) -> bool {
        matches!(self, MorphosError::Store(StoreError::Conflict { .. }))
    }
}

/// State store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Write conflict: expected version {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Encoding failure: {0}")]
    Encoding(String),
}

/// Entropy source errors
#[derive(Debug, Error)]
pub enum EntropyError {
    #[error("Entropy source unavailable: {0}")]
    Unavailable(String),

    #[error("Entropy value out of range: {0}")]
    OutOfRange(f64),
}

/// Sweet-spot finder errors
#[derive(Debug, Error)]
pub enum HesaError {
    #[error("Search space must have at least one dimension")]
    EmptySearchSpace,

    #[error("Search cancelled after {iterations} iterations")]
    Cancelled { iterations: u32 },

    #[error("Discovery ledger is busy with another search")]
    LedgerBusy,

    #[error("Discovery already recorded for cycle {0}")]
    DuplicateCycle(String),

    #[error("Ledger I/O failure: {0}")]
    Ledger(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Methodology weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<serde_json::Error> for MorphosError {
    fn from(err: serde_json::Error) -> Self {
        MorphosError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for MorphosError {
    fn from(err: std::io::Error) -> Self {
        MorphosError::Store(StoreError::Io(err.to_string()))
    }
}

impl From<anyhow::Error> for MorphosError {
    fn from(err: anyhow::Error) -> Self {
        MorphosError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MorphosError::Store(StoreError::Conflict {
            expected: 3,
            found: 4,
        });
        assert!(err.to_string().contains("expected version 3"));
    }

    #[test]
    fn test_conflict_is_retriable() {
        let conflict = MorphosError::from(StoreError::Conflict {
            expected: 1,
            found: 2,
        });
        assert!(conflict.is_retriable());

        let io = MorphosError::from(StoreError::Io("disk full".into()));
        assert!(!io.is_retriable());
    }
}
