//! # modchain
//!
//! A registry of content-addressed modules whose versions form signed,
//! tamper-evident chains.
//!
//! ## Overview
//!
//! The registry provides:
//!
//! - **Registration**: Store a module's files and sign a new version record,
//!   in one step or by preparing a record that is signed elsewhere
//! - **Dedup**: Registering unchanged content keeps the current head
//! - **History**: Walk, diff and verify the chain of versions
//! - **Setback**: Point a module back at an earlier version
//! - **Removal**: Delete a module and every object it references
//!
//! ## Key Concepts
//!
//! - **Version record**: Immutable and signed. Links to its predecessor by id.
//! - **Head**: The newest version of `(owner, name)`, kept in the registry table.
//! - **Owner**: The key that signed the module's first version. Later
//!   versions must be signed by the same key.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use modchain::{RegistryConfig, RegistryManager};
//! use modchain::core::{FileTree, Keypair, Signer};
//! use modchain::store::{LocalStore, SqliteStore};
//!
//! async fn example() {
//!     let keypair = Keypair::generate();
//!
//!     let cas = SqliteStore::open("modchain.db").unwrap();
//!     let local = LocalStore::at(".modchain").unwrap();
//!     let registry = RegistryManager::new(cas, local, RegistryConfig::default());
//!
//!     let files = FileTree::new().with_file("main.py", "print('hi')").unwrap();
//!     let v1 = registry
//!         .register("hello", &files, &keypair, Some("first"))
//!         .await
//!         .unwrap();
//!
//!     let history = registry.history("hello", &keypair.address()).await.unwrap();
//!     assert_eq!(history[0].id, v1.id);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `modchain::core` - Records, ids, keys and canonical encoding
//! - `modchain::store` - Content stores and the local cache
//! - `modchain::auth` - Signed request envelopes

pub mod bulk;
pub mod chain;
pub mod config;
pub mod error;
pub mod registry;
pub mod table;
pub mod worktree;

// Re-export component crates
pub use modchain_auth as auth;
pub use modchain_core as core;
pub use modchain_store as store;

// Re-export main types for convenience
pub use chain::{annotate, ChainError, ChainRegistry, ModuleInfo, LOCAL_NETWORK};
pub use config::{RegistryConfig, TableUpdate};
pub use error::{RegistryError, Result};
pub use registry::{
    FileChange, Prepared, RegisterOptions, RegistryManager, RemoveReport, Version,
    VersionSummary,
};
pub use table::RegistryTable;
pub use worktree::{is_untracked, WorkTree};

// Re-export commonly used core types
pub use modchain_core::{
    Address, ContentCommit, ContentId, FileMap, FileTree, Keypair, Signer, VersionRecord,
};
