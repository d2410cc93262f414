//! Strong type definitions for modchain.
//!
//! Content ids are newtypes so a blob id can never be confused with a module
//! name or an owner address at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An identifier handed out by a content-addressable backend.
///
/// The format is backend-defined (hex Blake3 for the bundled stores, a CID
/// for IPFS-style networks) and treated as opaque by the registry. Two puts of
/// the same bytes into the same backend yield the same `ContentId`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a backend id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id the bundled stores use for `bytes` (hex Blake3).
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Borrow the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw id string.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether the id is empty (never produced by a store).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(16)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.short())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
