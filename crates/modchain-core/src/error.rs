//! Error types for modchain core.

use thiserror::Error;

use crate::types::ContentId;

/// Core errors that can occur while encoding, decoding or signing records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid module name: {0:?}")]
    InvalidName(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for record structure, signatures and chain links.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("invalid module name: {0:?}")]
    InvalidName(String),

    #[error("updated ({updated}) precedes created ({created})")]
    TimestampOrder { created: i64, updated: i64 },

    #[error("link changes owner key: expected {expected}, got {got}")]
    KeyChanged { expected: String, got: String },

    #[error("link changes module name: expected {expected:?}, got {got:?}")]
    NameChanged { expected: String, got: String },

    #[error("broken prev link: expected {expected:?}, got {got:?}")]
    BrokenLink {
        expected: Option<ContentId>,
        got: Option<ContentId>,
    },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::InvalidName(name) => ValidationError::InvalidName(name),
            CoreError::MalformedRecord(msg)
            | CoreError::InvalidPath(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => ValidationError::StructuralError(msg),
        }
    }
}
