//! In-memory implementation of the ContentStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use modchain_core::ContentId;

use crate::error::{Result, StoreError};
use crate::traits::ContentStore;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
/// Ids are hex Blake3 digests of the stored bytes.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<ContentId, Bytes>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored id, sorted.
    pub fn ids(&self) -> Vec<ContentId> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<ContentId> = blobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Overwrite the bytes under an existing id without rehashing.
    ///
    /// Only useful to simulate a corrupted backend.
    pub fn corrupt(&self, id: &ContentId, bytes: impl Into<Bytes>) {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(id.clone(), bytes.into());
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId> {
        let id = ContentId::for_bytes(bytes);
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs
            .entry(id.clone())
            .or_insert_with(|| Bytes::copy_from_slice(bytes));
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn has(&self, id: &ContentId) -> Result<bool> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.contains_key(id))
    }

    async fn remove(&self, id: &ContentId) -> Result<bool> {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.remove(id).is_some())
    }

    async fn len(&self) -> Result<usize> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.len())
    }
}
