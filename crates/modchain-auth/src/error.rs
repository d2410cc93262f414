//! Error types for envelope verification.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while signing or verifying envelopes.
///
/// Every verification failure is a hard rejection.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Envelope time is further from now than the freshness window.
    #[error("stale envelope: age {age:?} exceeds {max_age:?}")]
    StaleEnvelope { age: Duration, max_age: Duration },

    /// Signature does not validate against the envelope key.
    #[error("envelope signature invalid")]
    SignatureInvalid,

    /// Payload hash differs from the signed hash.
    #[error("payload does not match signed data hash")]
    DataMismatch,

    /// Envelope could not be parsed or serialized.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::MalformedEnvelope(e.to_string())
    }
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
