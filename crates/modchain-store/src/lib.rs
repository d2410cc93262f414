//! # modchain store
//!
//! Storage for modchain. Provides a trait-based interface for
//! content-addressed blobs with SQLite and in-memory implementations, plus
//! the filesystem-backed [`LocalStore`] cache that holds the mutable registry
//! table.
//!
//! ## Key Types
//!
//! - [`ContentStore`] - The async trait for content-addressable backends
//! - [`SqliteStore`] - SQLite-based persistent blob storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`LocalStore`] - Key-value cache with TTL reads and optional encryption
//! - [`EntryCipher`] - Password-derived entry encryption
//!
//! ## Usage
//!
//! ```rust,no_run
//! use modchain_store::{ContentStore, LocalStore, SqliteStore};
//!
//! async fn example() {
//!     let cas = SqliteStore::open("modchain.db").unwrap();
//!     let id = cas.put(b"print('hello')").await.unwrap();
//!     let bytes = cas.get(&id).await.unwrap();
//!
//!     let local = LocalStore::at("/tmp/modchain").unwrap();
//!     local.put("notes/last", &id).unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Deterministic ids**: both bundled backends use hex Blake3 of the bytes
//! - **Idempotent puts**: storing the same bytes twice is a no-op
//! - **Stale reads are misses**: `LocalStore::get` with a max age returns `None`
//! - **Sealed before I/O**: encrypted entries never reach disk in plaintext

pub mod cipher;
pub mod error;
pub mod local;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use cipher::{EntryCipher, SealedEntry};
pub use error::{Result, StoreError};
pub use local::{LocalStore, LocalStoreConfig};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::ContentStore;
