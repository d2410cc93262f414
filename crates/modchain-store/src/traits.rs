//! ContentStore trait: the abstract interface for content-addressed blobs.
//!
//! This trait allows the registry to be storage-agnostic. Implementations
//! include SQLite (persistent) and in-memory (for tests). Remote backends
//! such as an IPFS node implement the same trait outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use modchain_core::ContentId;

use crate::error::Result;

/// The ContentStore trait: async interface for a content-addressable backend.
///
/// # Design Notes
///
/// - **Deterministic ids**: `put` of the same bytes always returns the same id.
/// - **Idempotent puts**: storing existing bytes again is a no-op.
/// - **Best-effort removal**: removing an absent id is not an error.
/// - No ordering guarantees across ids; every call is independently fallible.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their content id.
    async fn put(&self, bytes: &[u8]) -> Result<ContentId>;

    /// Fetch the bytes stored under `id`.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) if absent.
    async fn get(&self, id: &ContentId) -> Result<Bytes>;

    /// Check whether `id` is present.
    async fn has(&self, id: &ContentId) -> Result<bool>;

    /// Delete `id`. Returns whether anything was removed.
    async fn remove(&self, id: &ContentId) -> Result<bool>;

    /// Number of stored blobs.
    async fn len(&self) -> Result<usize>;
}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId> {
        (**self).put(bytes).await
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        (**self).get(id).await
    }

    async fn has(&self, id: &ContentId) -> Result<bool> {
        (**self).has(id).await
    }

    async fn remove(&self, id: &ContentId) -> Result<bool> {
        (**self).remove(id).await
    }

    async fn len(&self) -> Result<usize> {
        (**self).len().await
    }
}
