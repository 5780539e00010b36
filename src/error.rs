//! Error types for catfs

use crate::model::NodeKind;
use thiserror::Error;

/// Result type alias for catfs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in catfs operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid digest length: expected {expected} bytes, got {found}")]
    InvalidDigestLength { expected: usize, found: usize },

    #[error("No such entry: {0}")]
    NoSuchEntry(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Store lookup failed: {0}")]
    StoreLookupFailed(String),

    #[error("Commit is already boxed")]
    AlreadyBoxed,

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: NodeKind, found: NodeKind },

    #[error("Sequence violation: parent index {parent} is not below child index {child}")]
    SequenceViolation { parent: u64, child: u64 },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Ref not found: {0}")]
    RefNotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}
