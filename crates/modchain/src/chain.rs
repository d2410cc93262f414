//! Cross-reference with an external chain registry.
//!
//! A chain collaborator may know on-chain ids for an owner's modules. The
//! registry only uses it to annotate module info; it never gates writes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use modchain_core::{Address, ContentId, VersionRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Network name reported when no chain knows the module.
pub const LOCAL_NETWORK: &str = "local";

/// Read-only view of an on-chain module registry.
#[async_trait]
pub trait ChainRegistry: Send + Sync {
    /// Network name (e.g. `"testnet"`).
    fn network(&self) -> &str;

    /// Module name → on-chain id for `owner`.
    async fn registry(&self, owner: &Address) -> Result<BTreeMap<String, String>, ChainError>;
}

/// Failure reported by a chain collaborator. Opaque to the registry.
#[derive(Debug, Error)]
#[error("chain registry error: {0}")]
pub struct ChainError(pub String);

/// A version plus where it is known to live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub id: ContentId,
    #[serde(flatten)]
    pub record: VersionRecord,
    pub network: String,
    pub onchain_id: Option<String>,
}

/// Attach network and on-chain id to a version.
///
/// Chain lookup failures are logged and reported as the local network.
pub async fn annotate(
    id: ContentId,
    record: VersionRecord,
    chain: Option<&dyn ChainRegistry>,
) -> ModuleInfo {
    let local = |id: ContentId, record: VersionRecord| ModuleInfo {
        id,
        record,
        network: LOCAL_NETWORK.to_string(),
        onchain_id: None,
    };

    let Some(chain) = chain else {
        return local(id, record);
    };

    match chain.registry(&record.key).await {
        Ok(mut modules) => match modules.remove(&record.name) {
            Some(onchain_id) => ModuleInfo {
                id,
                record,
                network: chain.network().to_string(),
                onchain_id: Some(onchain_id),
            },
            None => local(id, record),
        },
        Err(e) => {
            warn!(name = %record.name, error = %e, "chain registry lookup failed");
            local(id, record)
        }
    }
}
