//! The registry table: owner → module name → head version id.
//!
//! This is the only mutable, non-content-addressed state. It persists as one
//! JSON document under the `registry` key of a [`LocalStore`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use modchain_core::{Address, ContentId};
use modchain_store::LocalStore;
use tracing::debug;

use crate::config::TableUpdate;
use crate::error::{RegistryError, Result};

/// LocalStore key holding the table.
pub const TABLE_KEY: &str = "registry";

type Table = BTreeMap<Address, BTreeMap<String, ContentId>>;

/// Persistent head table.
///
/// Read-modify-write cycles are serialized within the process. Across
/// processes, [`TableUpdate::StrictCas`] turns a lost race into
/// [`RegistryError::HeadMoved`] instead of a silent overwrite.
pub struct RegistryTable {
    local: Arc<LocalStore>,
    policy: TableUpdate,
    write_lock: Mutex<()>,
}

impl RegistryTable {
    pub fn new(local: Arc<LocalStore>, policy: TableUpdate) -> Self {
        Self {
            local,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Table> {
        Ok(self.local.get_or(TABLE_KEY, Table::new(), None)?)
    }

    fn save(&self, table: &Table) -> Result<()> {
        Ok(self.local.put(TABLE_KEY, table)?)
    }

    /// Head version id of `(owner, name)`.
    pub fn head(&self, owner: &Address, name: &str) -> Result<Option<ContentId>> {
        Ok(self
            .load()?
            .get(owner)
            .and_then(|modules| modules.get(name))
            .cloned())
    }

    /// Point `(owner, name)` at `new`.
    ///
    /// `expected` is the head the caller based its change on.
    pub fn set_head(
        &self,
        owner: &Address,
        name: &str,
        expected: Option<&ContentId>,
        new: &ContentId,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.load()?;

        let modules = table.entry(*owner).or_default();
        self.check_expected(name, expected, modules.get(name))?;
        modules.insert(name.to_string(), new.clone());

        self.save(&table)?;
        debug!(%owner, name, head = %new, "registry head updated");
        Ok(())
    }

    /// Drop `(owner, name)`. Returns whether an entry existed.
    pub fn remove(&self, owner: &Address, name: &str, expected: Option<&ContentId>) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.load()?;

        let Some(modules) = table.get_mut(owner) else {
            return Ok(false);
        };
        self.check_expected(name, expected, modules.get(name))?;

        let existed = modules.remove(name).is_some();
        if modules.is_empty() {
            table.remove(owner);
        }

        self.save(&table)?;
        Ok(existed)
    }

    /// Module names registered by `owner`, sorted.
    pub fn modules(&self, owner: &Address) -> Result<Vec<String>> {
        Ok(self
            .load()?
            .get(owner)
            .map(|modules| modules.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Every owner with at least one module, sorted.
    pub fn owners(&self) -> Result<Vec<Address>> {
        Ok(self.load()?.keys().copied().collect())
    }

    /// Owners that have a module called `name`.
    pub fn owners_of(&self, name: &str) -> Result<Vec<(Address, ContentId)>> {
        Ok(self
            .load()?
            .into_iter()
            .filter_map(|(owner, mut modules)| modules.remove(name).map(|id| (owner, id)))
            .collect())
    }

    fn check_expected(
        &self,
        name: &str,
        expected: Option<&ContentId>,
        found: Option<&ContentId>,
    ) -> Result<()> {
        if self.policy == TableUpdate::StrictCas && expected != found {
            return Err(RegistryError::HeadMoved {
                name: name.to_string(),
                expected: expected.cloned(),
                found: found.cloned(),
            });
        }
        Ok(())
    }
}
