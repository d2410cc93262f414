//! Registry configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the registry table is updated when a head changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableUpdate {
    /// Write only if the head is still the one read at the start of the
    /// operation. A concurrent writer makes the later one fail with
    /// [`RegistryError::HeadMoved`](crate::RegistryError::HeadMoved).
    #[default]
    StrictCas,
    /// Overwrite unconditionally. Concurrent registrations may orphan a
    /// version.
    LastWriterWins,
}

/// Configuration for [`RegistryManager`](crate::RegistryManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Table update policy.
    pub table_update: TableUpdate,
    /// Verify every signature while walking history.
    pub strict_history: bool,
    /// Worker pool size for bulk registration.
    pub max_concurrency: usize,
    /// Per-module limit for bulk registration.
    pub task_timeout: Option<Duration>,
    /// How long cached version summaries stay fresh.
    pub versions_max_age: Duration,
    /// Directory holding one working tree per module name.
    pub workspace: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table_update: TableUpdate::StrictCas,
            strict_history: false,
            max_concurrency: 8,
            task_timeout: None,
            versions_max_age: Duration::from_secs(100),
            workspace: PathBuf::from("modules"),
        }
    }
}
