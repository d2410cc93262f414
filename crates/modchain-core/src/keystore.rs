//! Key resolution: map a key identifier to a signer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::crypto::{Address, Keypair};

/// Resolves key identifiers (names) to signing keypairs.
///
/// Real deployments back this with an on-disk or hardware keyring. The
/// registry only ever asks for a signer by name.
pub trait KeyStore: Send + Sync {
    /// Look up the keypair registered under `id`.
    fn get(&self, id: &str) -> Option<Arc<Keypair>>;

    /// List the known key identifiers.
    fn ids(&self) -> Vec<String>;
}

/// In-memory key store.
///
/// Keys requested through [`MemoryKeyStore::get_or_derive`] are derived
/// deterministically from their name, so a name always maps to one address.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, Arc<Keypair>>>,
}

impl MemoryKeyStore {
    /// Create an empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing keypair under `id`, replacing any previous one.
    pub fn insert(&self, id: impl Into<String>, keypair: Keypair) -> Arc<Keypair> {
        let keypair = Arc::new(keypair);
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.insert(id.into(), Arc::clone(&keypair));
        keypair
    }

    /// Fetch the keypair for `id`, deriving and remembering it if absent.
    pub fn get_or_derive(&self, id: &str) -> Arc<Keypair> {
        if let Some(kp) = self.get(id) {
            return kp;
        }
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            keys.entry(id.to_string())
                .or_insert_with(|| Arc::new(Keypair::derive(id))),
        )
    }

    /// Find the key id whose address matches.
    pub fn id_for(&self, address: &Address) -> Option<String> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        keys.iter()
            .find(|(_, kp)| &kp.public_key() == address)
            .map(|(id, _)| id.clone())
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, id: &str) -> Option<Arc<Keypair>> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        keys.get(id).cloned()
    }

    fn ids(&self) -> Vec<String> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = keys.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_derive_is_stable() {
        let store = MemoryKeyStore::new();
        let a = store.get_or_derive("k1");
        let b = store.get_or_derive("k1");
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.public_key(), Keypair::derive("k1").public_key());
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = MemoryKeyStore::new();
        let kp = Keypair::generate();
        let address = kp.public_key();
        store.insert("ops", kp);

        assert_eq!(store.get("ops").unwrap().public_key(), address);
        assert_eq!(store.id_for(&address).as_deref(), Some("ops"));
        assert!(store.get("missing").is_none());
        assert_eq!(store.ids(), vec!["ops".to_string()]);
    }
}
