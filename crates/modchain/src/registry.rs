//! The registry manager: unified API over the content store, the head table
//! and working trees.
//!
//! Every version is stored as three layers of content-addressed objects:
//! file blobs, a [`FileMap`] over them, and a [`ContentCommit`] wrapping the
//! map with a comment and time. A signed [`VersionRecord`] points at the
//! commit and at the previous version, and the [`RegistryTable`] points at
//! the newest record.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use modchain_core::{
    now_millis, validate_link, validate_module_name, validate_record, Address, ContentCommit,
    ContentId, FileMap, FileTree, Signer, ValidationError, VersionRecord,
};
use modchain_store::{ContentStore, LocalStore, StoreError};

use crate::chain::{annotate, ChainRegistry, ModuleInfo};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::table::RegistryTable;
use crate::worktree::{is_untracked, WorkTree};

/// A version record together with its content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    pub id: ContentId,
    #[serde(flatten)]
    pub record: VersionRecord,
}

/// Short history entry, as cached by [`RegistryManager::versions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: ContentId,
    pub comment: Option<String>,
    pub updated: i64,
}

/// Blob ids of one path before and after the latest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub previous: Option<ContentId>,
    pub current: Option<ContentId>,
}

/// Optional parts of a registration.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub comment: Option<String>,
    /// Serialized interface description.
    pub schema: Option<Bytes>,
    /// Where the module is currently served.
    pub url: Option<String>,
    /// Owner whose module is updated. Defaults to the signer; any other
    /// owner is rejected with [`RegistryError::OwnershipMismatch`].
    pub owner: Option<Address>,
}

impl RegisterOptions {
    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }
}

/// Outcome of [`RegistryManager::prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// The content matches the head, which needs no new record.
    Unchanged(Version),
    /// The next record with a zero signature. Sign it over
    /// [`VersionRecord::signing_bytes`] and pass it to
    /// [`RegistryManager::register_signed`].
    Unsigned(VersionRecord),
}

/// Outcome of [`RegistryManager::remove`].
///
/// Deletes are best-effort; failures are collected here instead of aborting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveReport {
    /// Versions found in the module's history.
    pub versions: usize,
    /// Objects actually deleted from the content store.
    pub deleted: usize,
    /// Objects that could not be deleted or read, with the reason.
    pub failed: Vec<(ContentId, String)>,
}

impl RemoveReport {
    /// Whether every delete succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The registry manager.
///
/// Provides a unified API for:
/// - Registering modules with content dedup
/// - Resolving versions by id or by (owner, name)
/// - Walking, diffing and verifying history
/// - Reverting a module to an earlier version
/// - Removing a module and everything it references
pub struct RegistryManager<S: ContentStore> {
    /// The content-addressable backend.
    store: Arc<S>,
    /// Local cache holding the table and version summaries.
    local: Arc<LocalStore>,
    /// Owner → name → head.
    table: Arc<RegistryTable>,
    /// Module working directories.
    worktree: WorkTree,
    /// Configuration.
    config: RegistryConfig,
}

impl<S: ContentStore> Clone for RegistryManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            local: Arc::clone(&self.local),
            table: Arc::clone(&self.table),
            worktree: self.worktree.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: ContentStore> RegistryManager<S> {
    /// Create a new registry manager.
    pub fn new(store: S, local: LocalStore, config: RegistryConfig) -> Self {
        Self::with_shared(Arc::new(store), Arc::new(local), config)
    }

    /// Create a registry manager over shared backends.
    pub fn with_shared(store: Arc<S>, local: Arc<LocalStore>, config: RegistryConfig) -> Self {
        let table = Arc::new(RegistryTable::new(Arc::clone(&local), config.table_update));
        let worktree = WorkTree::new(config.workspace.clone());
        Self {
            store,
            local,
            table,
            worktree,
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn worktree(&self) -> &WorkTree {
        &self.worktree
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// Head version id of `(owner, name)`, if registered.
    pub fn head(&self, name: &str, owner: &Address) -> Result<Option<ContentId>> {
        self.table.head(owner, name)
    }

    /// Module names registered by `owner`.
    pub fn modules(&self, owner: &Address) -> Result<Vec<String>> {
        self.table.modules(owner)
    }

    /// Every owner with at least one module.
    pub fn owners(&self) -> Result<Vec<Address>> {
        self.table.owners()
    }

    /// Fetch and decode the record stored under `id`.
    pub async fn record(&self, id: &ContentId) -> Result<VersionRecord> {
        let bytes = self.fetch(id, "version").await?;
        VersionRecord::from_bytes(&bytes)
            .map_err(|e| RegistryError::IntegrityFailure(format!("version {id}: {e}")))
    }

    /// Resolve a version by id, or by module name.
    ///
    /// With an owner, `target` is looked up as that owner's module name
    /// first. Without one, a module name is accepted only if exactly one
    /// owner has registered it.
    pub async fn resolve(&self, target: &str, owner: Option<&Address>) -> Result<Version> {
        if let Some(owner) = owner {
            if let Some(id) = self.table.head(owner, target)? {
                return self.version(id).await;
            }
        }

        let id = ContentId::new(target);
        if !id.is_empty() && self.store.has(&id).await? {
            // Files, maps and commits share the store with records
            return match self.version(id).await {
                Err(RegistryError::IntegrityFailure(_)) => {
                    Err(RegistryError::NotFound(format!("version {target:?}")))
                }
                other => other,
            };
        }

        if owner.is_none() {
            let mut heads = self.table.owners_of(target)?;
            if heads.len() == 1 {
                let (_, id) = heads.remove(0);
                return self.version(id).await;
            }
        }

        Err(RegistryError::NotFound(format!("module or version {target:?}")))
    }

    /// File map of a resolved version.
    pub async fn content(&self, target: &str, owner: Option<&Address>) -> Result<FileMap> {
        let version = self.resolve(target, owner).await?;
        self.content_of(&version.record).await
    }

    /// Files of a resolved version, with their bytes.
    pub async fn files(&self, target: &str, owner: Option<&Address>) -> Result<FileTree> {
        let map = self.content(target, owner).await?;
        self.expand(&map).await
    }

    /// Schema blob of a resolved version.
    pub async fn schema(&self, target: &str, owner: Option<&Address>) -> Result<Option<Bytes>> {
        let version = self.resolve(target, owner).await?;
        match &version.record.schema {
            Some(id) => Ok(Some(self.fetch(id, "schema").await?)),
            None => Ok(None),
        }
    }

    /// Resolve a version and annotate it with chain information.
    pub async fn info(
        &self,
        target: &str,
        owner: Option<&Address>,
        chain: Option<&dyn ChainRegistry>,
    ) -> Result<ModuleInfo> {
        let version = self.resolve(target, owner).await?;
        Ok(annotate(version.id, version.record, chain).await)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register `files` as the next version of `name` for the signer.
    ///
    /// Registering content identical to the current head returns the head.
    pub async fn register(
        &self,
        name: &str,
        files: &FileTree,
        signer: &dyn Signer,
        comment: Option<&str>,
    ) -> Result<Version> {
        let options = RegisterOptions {
            comment: comment.map(str::to_string),
            ..RegisterOptions::default()
        };
        self.register_with(name, files, signer, options).await
    }

    /// Register the module's working tree from disk.
    pub async fn register_dir(
        &self,
        name: &str,
        signer: &dyn Signer,
        comment: Option<&str>,
    ) -> Result<Version> {
        let files = self.worktree.read(name)?;
        self.register(name, &files, signer, comment).await
    }

    /// Register with a schema blob and url hint.
    pub async fn register_with(
        &self,
        name: &str,
        files: &FileTree,
        signer: &dyn Signer,
        options: RegisterOptions,
    ) -> Result<Version> {
        validate_module_name(name)?;
        let signer_address = signer.address();
        let owner = options.owner.unwrap_or(signer_address);
        if owner != signer_address {
            return Err(RegistryError::OwnershipMismatch {
                name: name.to_string(),
                owner: owner.to_hex(),
                signer: signer_address.to_hex(),
            });
        }

        match self.prepare(name, files, &owner, options).await? {
            Prepared::Unchanged(head) => Ok(head),
            Prepared::Unsigned(record) => self.register_signed(record.signed_by(signer)).await,
        }
    }

    /// Store the content of the next version of `(owner, name)` and build
    /// its record without signing it.
    ///
    /// Content identical to the head yields [`Prepared::Unchanged`].
    pub async fn prepare(
        &self,
        name: &str,
        files: &FileTree,
        owner: &Address,
        options: RegisterOptions,
    ) -> Result<Prepared> {
        validate_module_name(name)?;
        if let Some(path) = files.paths().find(|p| is_untracked(p)) {
            return Err(RegistryError::InvalidPath(path.to_string()));
        }
        let head_id = self.table.head(owner, name)?;

        // 1. Store blobs and the file map
        let mut file_map = FileMap::new();
        for (path, contents) in files.iter() {
            let blob = self.store.put(contents).await?;
            file_map.insert(path, blob)?;
        }
        let data = self.store.put(&file_map.to_bytes()).await?;
        let schema = match &options.schema {
            Some(schema) => Some(self.store.put(schema).await?),
            None => None,
        };

        // 2. Compare against the head
        let head = match head_id {
            Some(id) => Some(self.version(id).await?),
            None => None,
        };
        if let Some(head) = &head {
            if head.record.key != *owner {
                return Err(RegistryError::OwnershipMismatch {
                    name: name.to_string(),
                    owner: head.record.key.to_hex(),
                    signer: owner.to_hex(),
                });
            }

            let head_commit = self.commit(&head.record.content).await?;
            if head_commit.data == data && head.record.schema == schema {
                debug!(name, %owner, version = %head.id, "content unchanged");
                return Ok(Prepared::Unchanged(head.clone()));
            }
        }

        // 3. Commit and build the record
        let now = now_millis();
        let commit = ContentCommit::new(data, options.comment, now);
        let content = self.store.put(&commit.to_bytes()).await?;

        let mut builder = VersionRecord::builder(name, content)
            .schema(schema)
            .url(options.url);
        let created = match &head {
            Some(head) => {
                builder = builder.prev(head.id.clone());
                head.record.created
            }
            None => now,
        };
        let record = builder
            .created(created)
            .updated(now.max(created))
            .unsigned(*owner);

        debug!(name, %owner, files = file_map.len(), "prepared version");
        Ok(Prepared::Unsigned(record))
    }

    /// Make a signed record the new head of its `(key, name)`.
    ///
    /// The record must be validly signed, its content must already be
    /// stored, and it must extend the current head exactly.
    pub async fn register_signed(&self, record: VersionRecord) -> Result<Version> {
        validate_record(&record)?;
        let owner = record.key;
        let name = record.name.clone();

        let head_id = self.table.head(&owner, &name)?;
        if record.prev != head_id {
            return Err(RegistryError::HeadMoved {
                name,
                expected: record.prev.clone(),
                found: head_id,
            });
        }
        if let Some(head_id) = &head_id {
            let head = self.record(head_id).await?;
            validate_link(&record, head_id, &head)?;
        }

        let map = self.content_of(&record).await?;
        if let Some(schema) = &record.schema {
            if !self.store.has(schema).await? {
                return Err(RegistryError::NotFound(format!("schema {schema}")));
            }
        }

        let id = self.store.put(&record.to_bytes()).await?;
        self.table.set_head(&owner, &name, head_id.as_ref(), &id)?;
        self.invalidate_versions(&owner, &name);

        info!(name, %owner, version = %id, files = map.len(), "registered new version");
        Ok(Version { id, record })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────

    /// Every version of `(owner, name)`, newest first.
    ///
    /// Signatures are checked when `strict_history` is configured.
    pub async fn history(&self, name: &str, owner: &Address) -> Result<Vec<Version>> {
        self.history_with(name, owner, self.config.strict_history)
            .await
    }

    /// Every version of `(owner, name)`, newest first.
    ///
    /// With `strict`, fails on the first record whose signature or link to
    /// its successor is invalid.
    pub async fn history_with(
        &self,
        name: &str,
        owner: &Address,
        strict: bool,
    ) -> Result<Vec<Version>> {
        let head = self.require_head(name, owner)?;

        let mut versions: Vec<Version> = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(head);

        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                return Err(RegistryError::IntegrityFailure(format!(
                    "history of {name:?} revisits {id}"
                )));
            }

            let record = self.record(&id).await?;
            if strict {
                validate_record(&record).map_err(|e| match e {
                    ValidationError::SignatureFailed => RegistryError::SignatureInvalid(id.clone()),
                    other => RegistryError::Validation(other),
                })?;
                if let Some(child) = versions.last() {
                    validate_link(&child.record, &id, &record)?;
                }
            }

            next = record.prev.clone();
            versions.push(Version { id, record });
        }

        Ok(versions)
    }

    /// Summaries of every version, newest first.
    ///
    /// Cached in the local store for `versions_max_age`; any mutation of the
    /// module drops the cache.
    pub async fn versions(&self, name: &str, owner: &Address) -> Result<Vec<VersionSummary>> {
        let key = versions_key(owner, name);
        if let Some(cached) = self
            .local
            .get::<Vec<VersionSummary>>(&key, Some(self.config.versions_max_age))?
        {
            return Ok(cached);
        }

        let mut summaries = Vec::new();
        for version in self.history(name, owner).await? {
            let commit = self.commit(&version.record.content).await?;
            summaries.push(VersionSummary {
                id: version.id,
                comment: commit.comment,
                updated: version.record.updated,
            });
        }

        self.local.put(&key, &summaries)?;
        Ok(summaries)
    }

    /// Paths whose blob differs between the head and its predecessor.
    ///
    /// A path missing on one side counts as changed. For a first version every
    /// path is reported with no previous blob.
    pub async fn diff(&self, name: &str, owner: &Address) -> Result<BTreeMap<String, FileChange>> {
        let head = self.version(self.require_head(name, owner)?).await?;
        let current = self.content_of(&head.record).await?;
        let previous = match &head.record.prev {
            Some(prev) => {
                let record = self.record(prev).await?;
                self.content_of(&record).await?
            }
            None => FileMap::new(),
        };

        let paths: BTreeSet<&str> = current.paths().chain(previous.paths()).collect();
        let changes = paths
            .into_iter()
            .filter_map(|path| {
                let (before, after) = (previous.get(path), current.get(path));
                (before != after).then(|| {
                    (
                        path.to_string(),
                        FileChange {
                            previous: before.cloned(),
                            current: after.cloned(),
                        },
                    )
                })
            })
            .collect();

        Ok(changes)
    }

    /// Whether a record's signature validates against its own key.
    pub fn verify(&self, record: &VersionRecord) -> bool {
        validate_record(record).is_ok()
    }

    /// Whether every record reachable from the head is validly signed and
    /// correctly linked. Stops at the first failure.
    pub async fn verify_history(&self, name: &str, owner: &Address) -> Result<bool> {
        let head = self.require_head(name, owner)?;

        let mut seen = HashSet::new();
        let mut child: Option<VersionRecord> = None;
        let mut next = Some(head);

        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                warn!(name, %id, "history cycle");
                return Ok(false);
            }

            let record = match self.record(&id).await {
                Ok(record) => record,
                Err(RegistryError::NotFound(_)) | Err(RegistryError::IntegrityFailure(_)) => {
                    warn!(name, %id, "unreadable version in history");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };

            if !self.verify(&record) {
                debug!(name, %id, "invalid signature in history");
                return Ok(false);
            }
            if let Some(child) = &child {
                if validate_link(child, &id, &record).is_err() {
                    debug!(name, %id, "broken link in history");
                    return Ok(false);
                }
            }

            next = record.prev.clone();
            child = Some(record);
        }

        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Setback and removal
    // ─────────────────────────────────────────────────────────────────────────

    /// Point `(owner, name)` back at an earlier version and check it out.
    ///
    /// No new version is created. The working tree is made to match the
    /// target exactly.
    pub async fn setback(&self, name: &str, owner: &Address, target: &ContentId) -> Result<Version> {
        let history = self.history(name, owner).await?;
        let current = history.first().map(|v| v.id.clone());

        let Some(version) = history.into_iter().find(|v| &v.id == target) else {
            return Err(RegistryError::NotInHistory {
                name: name.to_string(),
                id: target.clone(),
            });
        };

        let tree = self.expand(&self.content_of(&version.record).await?).await?;
        self.worktree.checkout(name, &tree)?;

        self.table.set_head(owner, name, current.as_ref(), target)?;
        self.invalidate_versions(owner, name);

        let head = self.head(name, owner)?;
        if head.as_ref() != Some(target) {
            return Err(RegistryError::IntegrityFailure(format!(
                "head of {name:?} is {head:?} after setback to {target}"
            )));
        }

        info!(name, %owner, version = %target, "set back");
        Ok(version)
    }

    /// Drop the table entry, then delete every object the module's history
    /// references.
    ///
    /// Fails with [`RegistryError::HeadMoved`] before deleting anything if
    /// the head changes while the history is read. Blobs are deleted even if
    /// another module shares them.
    pub async fn remove(&self, name: &str, owner: &Address) -> Result<RemoveReport> {
        let head = self.require_head(name, owner)?;
        let mut report = RemoveReport::default();
        let mut targets: Vec<ContentId> = Vec::new();

        let mut seen = HashSet::new();
        let mut next = Some(head.clone());
        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                break;
            }

            let record = match self.record(&id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(name, %id, error = %e, "cannot read version during removal");
                    report.failed.push((id.clone(), e.to_string()));
                    targets.push(id);
                    break;
                }
            };
            report.versions += 1;

            match self.commit(&record.content).await {
                Ok(commit) => {
                    match self.file_map(&commit.data).await {
                        Ok(map) => targets.extend(map.blob_ids().cloned()),
                        Err(e) => {
                            warn!(name, id = %commit.data, error = %e, "cannot read file map during removal");
                            report.failed.push((commit.data.clone(), e.to_string()));
                        }
                    }
                    targets.push(commit.data);
                }
                Err(e) => {
                    warn!(name, id = %record.content, error = %e, "cannot read commit during removal");
                    report.failed.push((record.content.clone(), e.to_string()));
                }
            }
            targets.push(record.content.clone());
            targets.extend(record.schema.clone());
            targets.push(id);

            next = record.prev;
        }

        let mut unique = HashSet::new();
        targets.retain(|id| unique.insert(id.clone()));

        // The table never points at deleted records
        self.table.remove(owner, name, Some(&head))?;
        self.invalidate_versions(owner, name);

        for id in targets {
            match self.store.remove(&id).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(name, %id, error = %e, "delete failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        info!(
            name,
            %owner,
            versions = report.versions,
            deleted = report.deleted,
            failed = report.failed.len(),
            "removed module"
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn require_head(&self, name: &str, owner: &Address) -> Result<ContentId> {
        self.table
            .head(owner, name)?
            .ok_or_else(|| RegistryError::NotFound(format!("module {name:?} of {owner}")))
    }

    async fn version(&self, id: ContentId) -> Result<Version> {
        let record = self.record(&id).await?;
        Ok(Version { id, record })
    }

    async fn fetch(&self, id: &ContentId, what: &str) -> Result<Bytes> {
        match self.store.get(id).await {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::NotFound(_)) => Err(RegistryError::NotFound(format!("{what} {id}"))),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&self, id: &ContentId) -> Result<ContentCommit> {
        let bytes = self.fetch(id, "commit").await?;
        ContentCommit::from_bytes(&bytes)
            .map_err(|e| RegistryError::IntegrityFailure(format!("commit {id}: {e}")))
    }

    async fn file_map(&self, id: &ContentId) -> Result<FileMap> {
        let bytes = self.fetch(id, "file map").await?;
        FileMap::from_bytes(&bytes)
            .map_err(|e| RegistryError::IntegrityFailure(format!("file map {id}: {e}")))
    }

    async fn content_of(&self, record: &VersionRecord) -> Result<FileMap> {
        let commit = self.commit(&record.content).await?;
        self.file_map(&commit.data).await
    }

    async fn expand(&self, map: &FileMap) -> Result<FileTree> {
        let mut tree = FileTree::new();
        for (path, id) in map.iter() {
            tree.insert(path, self.fetch(id, "blob").await?)?;
        }
        Ok(tree)
    }

    fn invalidate_versions(&self, owner: &Address, name: &str) {
        let key = versions_key(owner, name);
        if let Err(e) = self.local.remove(&key) {
            warn!(key = %key, error = %e, "failed to drop cached versions");
        }
    }
}

fn versions_key(owner: &Address, name: &str) -> String {
    format!("versions/{}/{}", owner.to_hex(), name)
}
