//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use modchain::{RegistryConfig, RegistryManager};
use modchain_core::{Address, FileTree, Keypair, Signer};
use modchain_store::{LocalStore, MemoryStore};
use tempfile::TempDir;

/// A test fixture with a keypair, a memory store and a registry over both.
///
/// Working trees and the local cache live in a temporary directory that is
/// deleted when the fixture drops.
pub struct TestFixture {
    pub keypair: Keypair,
    pub store: Arc<MemoryStore>,
    pub registry: RegistryManager<MemoryStore>,
    pub dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self::with_keypair(Keypair::generate(), RegistryConfig::default())
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::with_keypair(Keypair::from_seed(&seed), RegistryConfig::default())
    }

    /// Create with a custom configuration. The workspace is always placed
    /// inside the fixture's directory.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_keypair(Keypair::generate(), config)
    }

    fn with_keypair(keypair: Keypair, config: RegistryConfig) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let local = LocalStore::at(dir.path().join("storage")).expect("open local store");
        let config = RegistryConfig {
            workspace: dir.path().join("modules"),
            ..config
        };

        let store = Arc::new(MemoryStore::new());
        let registry = RegistryManager::with_shared(Arc::clone(&store), Arc::new(local), config);

        Self {
            keypair,
            store,
            registry,
            dir,
        }
    }

    /// The keypair's address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Build a file tree from string pairs.
    pub fn files(&self, pairs: &[(&str, &str)]) -> FileTree {
        FileTree::from_pairs(
            pairs
                .iter()
                .map(|(path, contents)| (path.to_string(), contents.to_string())),
        )
        .expect("valid fixture paths")
    }

    /// A second registry sharing this fixture's store and directory.
    pub fn registry_for(&self, config: RegistryConfig) -> RegistryManager<MemoryStore> {
        let local = LocalStore::at(self.dir.path().join("storage")).expect("open local store");
        let config = RegistryConfig {
            workspace: self.dir.path().join("modules"),
            ..config
        };
        RegistryManager::with_shared(Arc::clone(&self.store), Arc::new(local), config)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}
