//! This module provides a virtual filesystem (VFS) implementation backed by a single tar archive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use crate::core::{FsBackend, Result, utils};
use crate::error::VfsError;
use crate::vfs::{MetadataIndex, TarArchive};
use crate::{EntryType, Metadata};

/// Settings used when a `TarFS` is opened.
#[derive(Debug, Clone)]
pub struct TarFSOptions {
    default_archive: PathBuf,
    filler: u8,
}

impl TarFSOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host path used by `open("")`. Defaults to `fs.tar` in the process working directory.
    pub fn default_archive(&self) -> &Path {
        self.default_archive.as_path()
    }

    pub fn set_default_archive<P: AsRef<Path>>(&mut self, path: P) {
        self.default_archive = path.as_ref().to_path_buf();
    }

    /// Byte written as the payload of files created with a nonzero size.
    pub fn filler(&self) -> u8 {
        self.filler
    }

    pub fn set_filler(&mut self, filler: u8) {
        self.filler = filler;
    }
}

impl Default for TarFSOptions {
    fn default() -> Self {
        Self {
            default_archive: PathBuf::from("fs.tar"),
            filler: 0,
        }
    }
}

/// A virtual file system (VFS) whose durable state is a tar archive on the host.
///
/// Every query is answered from an in-memory `MetadataIndex`; every mutation is written
/// through to the archive before the call returns, so the two never diverge. The archive
/// file is opened only for the duration of a load or a rewrite.
///
/// ### Internal state
///
/// * `archive` — The host archive and its rewrite logic.
/// * `cwd` — Current Working Directory, an **inner absolute canonical path**.
///   Default value: `/`. Changed via `cd()`.
/// * `index` — Every entry of the archive keyed by inner canonical path.
///
/// ### Invariants
///
/// 1. **Root existence**: `/` is always present and is a directory.
/// 2. **Parent consistency**: every entry created through `TarFS` has a directory parent.
/// 3. **Uniqueness**: no two entries share a path; creation never overwrites.
/// 4. **Write-through**: after any successful mutation the archive on disk holds exactly
///    the entries of the index.
///
/// ### Thread Safety
///
/// This struct is **not thread‑safe**. Wrap it in a `Mutex` if it must be shared.
/// Nothing protects the archive against other processes.
///
/// ### Example
///
/// ```no_run
/// use vfs_tar::{EntryType, FsBackend, TarFS};
///
/// let mut fs = TarFS::bootstrap("/tmp/my_vfs.tar").unwrap();
///
/// fs.create("/docs", 0, EntryType::Directory).unwrap();
/// fs.create("/docs/note.txt", 5, EntryType::File).unwrap();
///
/// assert!(fs.exists("/docs/note.txt"));
/// assert_eq!(fs.ls("/docs").unwrap(), vec!["note.txt"]);
/// ```
pub struct TarFS {
    archive: TarArchive,
    cwd: String,
    index: MetadataIndex,
}

impl TarFS {
    /// Opens the archive at `path`.
    /// An empty `path` bootstraps a new archive at the default location instead.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, TarFSOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: TarFSOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            let default_archive = options.default_archive().to_path_buf();
            return Self::bootstrap_with(default_archive, options);
        }
        let archive = TarArchive::new(path, options.filler());
        let index = archive.load()?;
        Ok(Self {
            archive,
            cwd: utils::ROOT.to_string(),
            index,
        })
    }

    /// Creates a new archive at `path` holding the bootstrap entries:
    /// `/`, `/hello`, `/dir` and `/dir/file`.
    /// Fails if `path` is already occupied.
    pub fn bootstrap<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::bootstrap_with(path, TarFSOptions::default())
    }

    pub fn bootstrap_with<P: AsRef<Path>>(path: P, options: TarFSOptions) -> Result<Self> {
        let archive = TarArchive::new(path, options.filler());
        let entries = Self::bootstrap_entries();
        archive.bootstrap(&entries)?;

        let mut index = MetadataIndex::new();
        for meta in &entries {
            index.add(meta.path(), meta.size(), meta.entry_type());
        }
        Ok(Self {
            archive,
            cwd: utils::ROOT.to_string(),
            index,
        })
    }

    /// Host path of the backing archive.
    pub fn archive_path(&self) -> &Path {
        self.archive.path()
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    fn bootstrap_entries() -> Vec<Metadata> {
        vec![
            Metadata::new("/", 0, EntryType::Directory),
            Metadata::new("/hello", 0, EntryType::File),
            Metadata::new("/dir", 0, EntryType::Directory),
            Metadata::new("/dir/file", 0, EntryType::File),
        ]
    }

    /// Checks that `path` may be created given the index plus the directories
    /// already accepted earlier in the same batch.
    fn check_creatable(&self, path: &str, pending: &HashMap<String, EntryType>) -> Result<()> {
        if self.index.exists(path) || pending.contains_key(path) {
            return Err(VfsError::already_exists("create", path).into());
        }
        let Some(parent) = utils::parent(path) else {
            return Err(VfsError::already_exists("create", path).into());
        };
        if self.index.is_dir(parent) || pending.get(parent) == Some(&EntryType::Directory) {
            return Ok(());
        }
        if self.index.exists(parent) || pending.contains_key(parent) {
            Err(VfsError::not_a_directory("create", parent).into())
        } else {
            Err(VfsError::not_found("create", parent).into())
        }
    }
}

impl FsBackend for TarFS {
    /// Returns current working directory related to the vfs root.
    fn cwd(&self) -> &str {
        &self.cwd
    }

    fn resolve(&self, path: &str) -> (String, bool) {
        let inner = utils::normalize(path, &self.cwd);
        let is_dir = self.index.is_dir(&inner);
        (inner, is_dir)
    }

    /// Changes the current working directory.
    /// * `path` can be in relative or absolute form, but in both cases it must be an existing
    ///   directory. On error the cwd is left unchanged.
    fn cd(&mut self, path: &str) -> Result<()> {
        let (target, is_dir) = self.resolve(path);
        if !is_dir {
            if self.index.exists(&target) {
                return Err(VfsError::not_a_directory("cd", target).into());
            }
            return Err(VfsError::not_found("cd", target).into());
        }
        self.cwd = target;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let (inner, _) = self.resolve(path);
        self.index.exists(&inner)
    }

    fn metadata(&self, path: &str) -> Result<Metadata> {
        let (inner, _) = self.resolve(path);
        Ok(self.index.get(&inner)?.clone())
    }

    /// Lists only the **immediate children** of the given directory, in name order.
    /// Fails with `NotADirectory` if `path` is a file or does not exist.
    fn ls(&self, path: &str) -> Result<Vec<String>> {
        let (inner, is_dir) = self.resolve(path);
        if !is_dir {
            return Err(VfsError::not_a_directory("ls", inner).into());
        }
        Ok(self
            .index
            .children(&inner)
            .map(|meta| utils::file_name(meta.path()).to_string())
            .collect())
    }

    /// Creates a single file or directory.
    /// The parent directory must already exist; nothing is created implicitly.
    fn create(&mut self, path: &str, size: u64, entry_type: EntryType) -> Result<()> {
        let (inner, _) = self.resolve(path);
        self.create_all(&[Metadata::new(inner, size, entry_type)])
    }

    fn create_all(&mut self, entries: &[Metadata]) -> Result<()> {
        let mut batch: Vec<Metadata> = Vec::with_capacity(entries.len());
        let mut pending: HashMap<String, EntryType> = HashMap::with_capacity(entries.len());
        for meta in entries {
            let (inner, _) = self.resolve(meta.path());
            self.check_creatable(&inner, &pending)?;
            // directories have no payload in the archive
            let size = if meta.is_dir() { 0 } else { meta.size() };
            pending.insert(inner.clone(), meta.entry_type());
            batch.push(Metadata::new(inner, size, meta.entry_type()));
        }
        if batch.is_empty() {
            return Ok(());
        }

        for meta in &batch {
            self.index.add(meta.path(), meta.size(), meta.entry_type());
        }
        if let Err(e) = self.archive.append(&batch) {
            for meta in &batch {
                self.index.remove(meta.path());
            }
            return Err(e);
        }

        debug!("created {} entries in {}", batch.len(), self.archive_path().display());
        Ok(())
    }

    /// Removes a file or an empty directory.
    /// Non-empty directories and the root are refused; removal never cascades.
    fn rm(&mut self, path: &str) -> Result<()> {
        let (inner, is_dir) = self.resolve(path);
        if utils::is_virtual_root(&inner) {
            return Err(VfsError::InvalidArgument {
                op: "rm",
                reason: "the root cannot be removed".to_string(),
            }
            .into());
        }
        let meta = match self.index.get(&inner) {
            Ok(meta) => meta.clone(),
            Err(_) => return Err(VfsError::not_found("rm", inner).into()),
        };
        if is_dir && self.index.children(&inner).next().is_some() {
            return Err(VfsError::NotEmpty { op: "rm", path: inner }.into());
        }

        self.index.remove(&inner);
        if let Err(e) = self.archive.remove(&inner) {
            self.index.add(meta.path(), meta.size(), meta.entry_type());
            return Err(e);
        }
        Ok(())
    }
}
