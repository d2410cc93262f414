//! SQLite implementation of the ContentStore trait.
//!
//! A persistent single-file CAS. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use modchain_core::{now_millis, ContentId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::ContentStore;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId> {
        let id = ContentId::for_bytes(bytes);
        let bytes = bytes.to_vec();
        let key = id.clone();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blobs (id, bytes, size, stored_at) VALUES (?1, ?2, ?3, ?4)",
                params![key.as_str(), bytes, bytes.len() as i64, now_millis()],
            )?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        let id = id.clone();

        self.blocking(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT bytes FROM blobs WHERE id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            bytes
                .map(Bytes::from)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn has(&self, id: &ContentId) -> Result<bool> {
        let id = id.clone();

        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM blobs WHERE id = ?1)",
                params![id.as_str()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn remove(&self, id: &ContentId) -> Result<bool> {
        let id = id.clone();

        self.blocking(move |conn| {
            let changed = conn.execute("DELETE FROM blobs WHERE id = ?1", params![id.as_str()])?;
            Ok(changed > 0)
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}
