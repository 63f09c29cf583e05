//! Flat in-memory index of every entry known to a virtual file system.

use std::collections::BTreeMap;

use crate::core::utils::{self, ROOT, SEPARATOR};
use crate::error::VfsError;
use crate::{EntryType, Metadata};

/// Ordered map from inner canonical path to `Metadata`.
///
/// ### Invariants
///
/// 1. **Root existence**: `/` is always present and has type `Directory`.
/// 2. **Canonical keys**: directory keys never end with `/`, except the root itself.
/// 3. **Uniqueness**: `add()` never overwrites an existing key.
///
/// Parent consistency (every non-root entry has a directory parent) is not checked
/// here; `TarFS` verifies it before every mutation.
///
/// The map is ordered, so the children of a directory form one contiguous key
/// range and every listing comes out sorted.
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    entries: BTreeMap<String, Metadata>,
}

impl MetadataIndex {
    /// Creates an index holding only the root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            ROOT.to_string(),
            Metadata::new(ROOT, 0, EntryType::Directory),
        );
        Self { entries }
    }

    /// Inserts a new entry. Returns `false` (and changes nothing) if `path` is
    /// already present.
    pub fn add(&mut self, path: &str, size: u64, entry_type: EntryType) -> bool {
        let key = match entry_type {
            EntryType::Directory if !utils::is_virtual_root(path) => {
                let trimmed = path.trim_end_matches(SEPARATOR);
                if trimmed.is_empty() { ROOT } else { trimmed }
            }
            _ => path,
        };
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries
            .insert(key.to_string(), Metadata::new(key, size, entry_type));
        true
    }

    /// Removes a single entry. Children of a removed directory are left in place.
    /// Returns `false` if `path` is absent or is the root.
    pub fn remove(&mut self, path: &str) -> bool {
        if utils::is_virtual_root(path) {
            return false;
        }
        self.entries.remove(path).is_some()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Result<&Metadata, VfsError> {
        self.entries
            .get(path)
            .ok_or_else(|| VfsError::not_found("stat", path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.entries.get(path).is_some_and(Metadata::is_dir)
    }

    /// Iterates over the immediate children of `dir` in path order.
    pub fn children(&self, dir: &str) -> impl Iterator<Item = &Metadata> {
        let prefix = if utils::is_virtual_root(dir) {
            ROOT.to_string()
        } else {
            format!("{dir}{SEPARATOR}")
        };
        let start = prefix.len();
        self.entries
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
            .filter(move |(key, _)| {
                let rest = &key[start..];
                !rest.is_empty() && !rest.contains(SEPARATOR)
            })
            .map(|(_, meta)| meta)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metadata> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MetadataIndex {
    fn default() -> Self {
        Self::new()
    }
}
