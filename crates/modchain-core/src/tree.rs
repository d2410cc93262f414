//! File trees: the raw input to a registration.
//!
//! A [`FileTree`] maps relative paths to file contents. Paths are validated on
//! insert so a stored file map can always be written back under a module
//! directory without escaping it.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::CoreError;

/// Validate a relative file path.
///
/// Paths are `/`-separated, relative, and contain no empty, `.` or `..`
/// segments.
pub fn validate_path(path: &str) -> Result<(), CoreError> {
    if path.is_empty() {
        return Err(CoreError::InvalidPath("empty path".into()));
    }
    if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(CoreError::InvalidPath(path.to_string()));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(CoreError::InvalidPath(path.to_string()));
        }
    }
    Ok(())
}

/// Validate a module name.
///
/// Names are non-empty, at most 128 bytes, and limited to ASCII
/// alphanumerics plus `.`, `_` and `-`. They never contain `/` since they
/// are used as path segments in the local cache.
pub fn validate_module_name(name: &str) -> Result<(), CoreError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidName(name.to_string()))
    }
}

/// An ordered set of files keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    files: BTreeMap<String, Bytes>,
}

impl FileTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, replacing any previous contents at `path`.
    ///
    /// A path cannot be both a file and a directory of another file.
    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Bytes>) -> Result<(), CoreError> {
        let path = path.into();
        validate_path(&path)?;
        if self.shadows(&path) {
            return Err(CoreError::InvalidPath(format!("{path} collides with a directory or file")));
        }
        self.files.insert(path, contents.into());
        Ok(())
    }

    fn shadows(&self, path: &str) -> bool {
        let parent_is_file = path
            .match_indices('/')
            .any(|(at, _)| self.files.contains_key(&path[..at]));
        let dir = format!("{path}/");
        let has_children = self
            .files
            .range(dir.clone()..)
            .next()
            .is_some_and(|(other, _)| other.starts_with(&dir));
        parent_is_file || has_children
    }

    /// Builder-style insert.
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Bytes>) -> Result<Self, CoreError> {
        self.insert(path, contents)?;
        Ok(self)
    }

    /// Build a tree from `(path, contents)` pairs.
    pub fn from_pairs<I, P, C>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Bytes>,
    {
        let mut tree = Self::new();
        for (path, contents) in pairs {
            tree.insert(path, contents)?;
        }
        Ok(tree)
    }

    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl IntoIterator for FileTree {
    type Item = (String, Bytes);
    type IntoIter = std::collections::btree_map::IntoIter<String, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        for p in ["a.py", "src/lib.rs", "deep/nested/dir/file.txt", ".env"] {
            assert!(validate_path(p).is_ok(), "{p} should be valid");
        }
    }

    #[test]
    fn test_invalid_paths() {
        for p in ["", "/etc/passwd", "../up", "a/../b", "a//b", "a/./b", "trailing/", "win\\path"] {
            assert!(validate_path(p).is_err(), "{p:?} should be rejected");
        }
    }

    #[test]
    fn test_module_names() {
        assert!(validate_module_name("calc").is_ok());
        assert!(validate_module_name("model.openrouter").is_ok());
        assert!(validate_module_name("my_mod-2").is_ok());
        assert!(validate_module_name("").is_err());
        assert!(validate_module_name("a/b").is_err());
        assert!(validate_module_name("..").is_err());
        assert!(validate_module_name("spaced name").is_err());
    }

    #[test]
    fn test_tree_is_ordered() {
        let tree = FileTree::from_pairs([("z.py", "z"), ("a.py", "a"), ("m/x.py", "x")]).unwrap();
        let paths: Vec<&str> = tree.paths().collect();
        assert_eq!(paths, vec!["a.py", "m/x.py", "z.py"]);
        assert_eq!(tree.get("a.py").unwrap().as_ref(), b"a");
    }

    #[test]
    fn test_tree_rejects_escape() {
        let mut tree = FileTree::new();
        assert!(tree.insert("../evil", "x").is_err());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_tree_rejects_file_directory_collision() {
        let mut tree = FileTree::from_pairs([("pkg/b.py", "b")]).unwrap();
        assert!(tree.insert("pkg", "x").is_err());
        assert!(tree.insert("pkg/b.py/c", "x").is_err());
        assert!(tree.insert("pkg/b.py", "new").is_ok());
        assert!(tree.insert("pkg.py", "ok").is_ok());
        assert_eq!(tree.len(), 2);
    }
}
