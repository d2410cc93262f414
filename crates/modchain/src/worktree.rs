//! Working trees: the on-disk directories modules are registered from and
//! checked out into.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use modchain_core::{validate_module_name, FileTree};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{RegistryError, Result};

/// Directory entries that are never part of a module.
fn is_ignored(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name == "__pycache__"
}

fn is_ignored_entry(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(is_ignored)
}

/// Whether a relative module path passes through a hidden entry or
/// `__pycache__`. Such paths are never read from disk, so they cannot be
/// registered or checked out.
pub fn is_untracked(path: &str) -> bool {
    path.split('/').any(is_ignored)
}

/// One directory per module name under a common root.
#[derive(Debug, Clone)]
pub struct WorkTree {
    root: PathBuf,
}

impl WorkTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of module `name`.
    pub fn module_dir(&self, name: &str) -> Result<PathBuf> {
        validate_module_name(name)?;
        Ok(self.root.join(name))
    }

    /// Read every file of module `name`, skipping hidden entries and
    /// `__pycache__`.
    pub fn read(&self, name: &str) -> Result<FileTree> {
        let dir = self.module_dir(name)?;
        if !dir.is_dir() {
            return Err(RegistryError::NotFound(format!(
                "working tree {}",
                dir.display()
            )));
        }

        let mut tree = FileTree::new();
        for rel in list_files(&dir)? {
            let contents = fs::read(dir.join(&rel))?;
            tree.insert(rel, contents)?;
        }
        Ok(tree)
    }

    /// Make the working tree of `name` match `tree` exactly.
    ///
    /// Entries whose kind blocks a target file are cleared first: a
    /// directory where a file goes, or a file where a parent directory goes.
    /// Every target file is then written before anything else is deleted, so
    /// an interrupted checkout leaves extra files but never missing ones.
    pub fn checkout(&self, name: &str, tree: &FileTree) -> Result<Vec<String>> {
        if let Some(path) = tree.paths().find(|p| is_untracked(p)) {
            return Err(RegistryError::InvalidPath(path.to_string()));
        }

        let dir = self.module_dir(name)?;
        fs::create_dir_all(&dir)?;
        let mut removed = clear_conflicts(&dir, tree)?;

        for (path, contents) in tree.iter() {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, contents)?;
        }

        let keep: BTreeSet<&str> = tree.paths().collect();
        for rel in list_files(&dir)? {
            if !keep.contains(rel.as_str()) {
                fs::remove_file(dir.join(&rel))?;
                removed.push(rel);
            }
        }
        prune_empty_dirs(&dir)?;

        debug!(name, written = tree.len(), removed = removed.len(), "working tree checked out");
        Ok(removed)
    }
}

/// Remove entries that stand where a target file or one of its parent
/// directories must go. Returns the removed paths.
fn clear_conflicts(dir: &Path, tree: &FileTree) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for path in tree.paths() {
        let segments: Vec<&str> = path.split('/').collect();
        let mut current = dir.to_path_buf();

        for (depth, segment) in segments.iter().enumerate() {
            current.push(segment);
            let is_target = depth + 1 == segments.len();
            let meta = match fs::symlink_metadata(&current) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            };

            if is_target && meta.is_dir() {
                fs::remove_dir_all(&current)?;
            } else if !is_target && !meta.is_dir() {
                fs::remove_file(&current)?;
            } else {
                continue;
            }
            debug!(path = %current.display(), "cleared conflicting entry");
            removed.push(segments[..=depth].join("/"));
            break;
        }
    }
    Ok(removed)
}

/// Relative `/`-joined paths of every non-ignored file under `dir`, sorted.
fn list_files(dir: &Path) -> Result<Vec<String>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_ignored_entry(e));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| RegistryError::Io(e.into()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        files.push(relative_path(dir, entry.path())?);
    }
    files.sort();
    Ok(files)
}

fn relative_path(dir: &Path, path: &Path) -> Result<String> {
    let invalid = || RegistryError::InvalidPath(path.display().to_string());
    let rel = path.strip_prefix(dir).map_err(|_| invalid())?;
    let segments = rel
        .iter()
        .map(|segment| segment.to_str().ok_or_else(invalid))
        .collect::<Result<Vec<_>>>()?;
    Ok(segments.join("/"))
}

/// Remove empty subdirectories below `dir`, deepest first. Ignored
/// directories are left alone.
fn prune_empty_dirs(dir: &Path) -> Result<()> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| !is_ignored_entry(e));

    for entry in walker {
        let entry = entry.map_err(|e| RegistryError::Io(e.into()))?;
        if entry.file_type().is_dir() && fs::read_dir(entry.path())?.next().is_none() {
            fs::remove_dir(entry.path())?;
        }
    }
    Ok(())
}
