//! Error types for the registry.

use modchain_core::{ContentId, CoreError, ValidationError};
use modchain_store::StoreError;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No module, version or blob under this name or id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The head of a module is owned by a different key than the signer.
    #[error("module {name:?} is owned by {owner}, not {signer}")]
    OwnershipMismatch {
        name: String,
        owner: String,
        signer: String,
    },

    /// A record's signature does not validate against its key.
    #[error("invalid signature on version {0}")]
    SignatureInvalid(ContentId),

    /// Stored data is inconsistent (undecodable record, broken or cyclic chain).
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    /// The head changed between read and write.
    #[error("head of {name:?} moved: expected {expected:?}, found {found:?}")]
    HeadMoved {
        name: String,
        expected: Option<ContentId>,
        found: Option<ContentId>,
    },

    /// Setback target is not a version of the module.
    #[error("version {id} is not in the history of {name:?}")]
    NotInHistory { name: String, id: ContentId },

    /// File path or module name that would escape its directory.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// I/O error on a working tree.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bulk registration task panicked, timed out or was cancelled.
    #[error("task for {name:?} failed: {reason}")]
    TaskFailed { name: String, reason: String },
}

impl From<CoreError> for RegistryError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidPath(p) | CoreError::InvalidName(p) => RegistryError::InvalidPath(p),
            other => RegistryError::IntegrityFailure(other.to_string()),
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
