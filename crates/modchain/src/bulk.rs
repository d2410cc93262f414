//! Bulk registration over a bounded worker pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use modchain_core::{FileTree, Signer};
use modchain_store::ContentStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{RegistryError, Result};
use crate::registry::{RegistryManager, Version};

impl<S: ContentStore + 'static> RegistryManager<S> {
    /// Register many modules concurrently, at most `max_concurrency` at once.
    ///
    /// Every input name gets an entry in the result. A module that fails,
    /// panics or exceeds `task_timeout` does not affect the others.
    pub async fn register_all(
        &self,
        modules: BTreeMap<String, FileTree>,
        signer: Arc<dyn Signer>,
        comment: Option<String>,
    ) -> BTreeMap<String, Result<Version>> {
        let names: Vec<String> = modules.keys().cloned().collect();
        let total = names.len();
        let limit = self.config().task_timeout;

        let sem = Arc::new(Semaphore::new(self.config().max_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let mut results = BTreeMap::new();

        for (name, files) in modules {
            let permit = match sem.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let reason = e.to_string();
                    results.insert(name.clone(), Err(RegistryError::TaskFailed { name, reason }));
                    continue;
                }
            };

            let registry = self.clone();
            let signer = Arc::clone(&signer);
            let comment = comment.clone();

            join_set.spawn(async move {
                let _permit = permit;

                // Run the registration in its own task so a panic is caught
                // at the join and the name is kept.
                let task_name = name.clone();
                let work = tokio::spawn(async move {
                    registry
                        .register(&task_name, &files, signer.as_ref(), comment.as_deref())
                        .await
                });
                let abort = work.abort_handle();

                let joined = match limit {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            abort.abort();
                            let reason = format!("timed out after {limit:?}");
                            return (name.clone(), Err(RegistryError::TaskFailed { name, reason }));
                        }
                    },
                    None => work.await,
                };

                let result = joined.unwrap_or_else(|e| {
                    Err(RegistryError::TaskFailed {
                        name: name.clone(),
                        reason: e.to_string(),
                    })
                });
                (name, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, result)) => {
                    match &result {
                        Ok(version) => info!(module = %name, version = %version.id, "registered"),
                        Err(e) => warn!(module = %name, error = %e, "registration failed"),
                    }
                    results.insert(name, result);
                }
                Err(e) => error!(error = %e, "bulk registration task failed to join"),
            }
        }

        for name in names {
            results.entry(name.clone()).or_insert_with(|| {
                Err(RegistryError::TaskFailed {
                    name,
                    reason: "task lost".to_string(),
                })
            });
        }

        let failed = results.values().filter(|r| r.is_err()).count();
        info!(total, failed, "bulk registration finished");
        results
    }
}
