//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing stored under this id or key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local store key that cannot be mapped to a file under the root.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Encrypted entry read without a password.
    #[error("entry {0:?} is encrypted and no password is configured")]
    Locked(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    /// Wrong password or corrupted ciphertext.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
