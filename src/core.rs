use crate::vfs::traverse;
use crate::{EntryType, Metadata};

/// Operations every virtual file system backend must provide.
///
/// Paths are `/`-separated strings, either absolute or relative to the current
/// working directory. Implementors only supply the primitives; `copy()`, `tree()`
/// and `find()` are built on top of them.
pub trait FsBackend {
    /// Returns current working directory as an inner absolute canonical path.
    fn cwd(&self) -> &str;

    /// Resolves `path` against the cwd.
    /// Returns the canonical path and whether it names an existing directory.
    /// Never fails: a missing entry is reported as `false`.
    fn resolve(&self, path: &str) -> (String, bool);

    /// Changes the current working directory.
    ///
    /// # Arguments
    /// * `path` - absolute or relative path of an existing directory.
    ///
    /// # Returns
    /// * `Ok(())` - If the cwd now points to `path`.
    /// * `Err(anyhow::Error)` - `NotFound` if nothing exists at `path`, `NotADirectory`
    ///   if it is a file. The cwd is left unchanged.
    fn cd(&mut self, path: &str) -> Result<()>;

    /// Checks if a file or directory exists at `path`.
    ///
    /// # Arguments
    /// * `path` - absolute or relative path to check.
    ///
    /// # Returns
    /// * `true` if an entry exists, `false` otherwise.
    fn exists(&self, path: &str) -> bool;

    /// Returns a copy of the metadata stored for `path`.
    ///
    /// # Arguments
    /// * `path` - absolute or relative path of an existing entry.
    ///
    /// # Returns
    /// * `Ok(Metadata)` - The canonical path, declared size and kind of the entry.
    /// * `Err(anyhow::Error)` - `NotFound` if nothing exists at `path`.
    fn metadata(&self, path: &str) -> Result<Metadata>;

    /// Returns names of the immediate children of the directory `path`.
    fn ls(&self, path: &str) -> Result<Vec<String>>;

    /// Creates a single file or directory and persists it before returning.
    ///
    /// # Arguments
    /// * `path` - absolute or relative path of the new entry.
    /// * `size` - declared size in bytes; ignored for directories, which are stored with size 0.
    /// * `entry_type` - `EntryType::File` or `EntryType::Directory`.
    ///
    /// # Returns
    /// * `Ok(())` - If the entry is in the backend and in durable storage.
    /// * `Err(anyhow::Error)` - If any of the following occurs:
    ///   - Something already exists at `path` (`AlreadyExists`).
    ///   - The parent is missing (`NotFound`) or is a file (`NotADirectory`).
    ///   - The storage could not be written (`ArchiveIo`); nothing is created then.
    fn create(&mut self, path: &str, size: u64, entry_type: EntryType) -> Result<()>;

    /// Creates several entries at once. Either all of them are committed or none.
    /// Entries are created in order, so a directory may precede its own children.
    fn create_all(&mut self, entries: &[Metadata]) -> Result<()>;

    /// Removes a file or an empty directory. Never cascades.
    ///
    /// # Arguments
    /// * `path` - absolute or relative path of the entry to remove.
    ///
    /// # Returns
    /// * `Ok(())` - If the entry is gone from the backend and from durable storage.
    /// * `Err(anyhow::Error)` - If any of the following occurs:
    ///   - `path` is the root (`InvalidArgument`).
    ///   - Nothing exists at `path` (`NotFound`).
    ///   - `path` is a directory that still has children (`NotEmpty`).
    ///   - The storage could not be rewritten (`ArchiveIo`); the entry is kept then.
    fn rm(&mut self, path: &str) -> Result<()>;

    /// Copies `source` to `destination` and returns the path that was created.
    fn copy(&mut self, source: &str, destination: &str) -> Result<String> {
        traverse::copy(self, source, destination)
    }

    /// Renders the directory tree under `path`, two spaces of indent per level.
    fn tree(&self, path: &str) -> String {
        traverse::tree(self, path)
    }

    /// Returns full paths of everything below the cwd whose name contains `term`.
    fn find(&self, term: &str) -> Vec<String> {
        traverse::find(self, term)
    }
}

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub mod utils {
    pub const SEPARATOR: char = '/';
    pub const ROOT: &str = "/";

    /// Turns `path` into an inner absolute canonical path.
    /// Relative paths are resolved against `cwd`, which must itself be canonical.
    /// `..` above the root stays at the root.
    pub fn normalize(path: &str, cwd: &str) -> String {
        let path = if path.is_empty() { "." } else { path };
        let joined;
        let full = if path.starts_with(SEPARATOR) {
            path
        } else {
            joined = format!("{}{}{}", cwd.trim_end_matches(SEPARATOR), SEPARATOR, path);
            joined.as_str()
        };

        let mut segments: Vec<&str> = Vec::new();
        for segment in full.split(SEPARATOR) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                name => segments.push(name),
            }
        }

        if segments.is_empty() {
            return ROOT.to_string();
        }
        let mut result = String::with_capacity(full.len());
        for segment in segments {
            result.push(SEPARATOR);
            result.push_str(segment);
        }
        result
    }

    pub fn is_virtual_root(path: &str) -> bool {
        path == ROOT
    }

    /// Joins a canonical directory and a single entry name.
    pub fn join(dir: &str, name: &str) -> String {
        if is_virtual_root(dir) {
            format!("{SEPARATOR}{name}")
        } else {
            format!("{dir}{SEPARATOR}{name}")
        }
    }

    /// Canonical parent of a canonical path; `None` for the root.
    pub fn parent(path: &str) -> Option<&str> {
        if is_virtual_root(path) {
            return None;
        }
        match path.rfind(SEPARATOR) {
            Some(0) => Some(ROOT),
            Some(idx) => Some(&path[..idx]),
            None => None,
        }
    }

    /// Last segment of a canonical path (empty for the root).
    pub fn file_name(path: &str) -> &str {
        match path.rfind(SEPARATOR) {
            Some(idx) => &path[idx + 1..],
            None => path,
        }
    }

    /// True if `path` lies strictly below `ancestor`, respecting segment boundaries.
    pub fn is_descendant(path: &str, ancestor: &str) -> bool {
        if is_virtual_root(ancestor) {
            return !is_virtual_root(path) && path.starts_with(SEPARATOR);
        }
        path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path[ancestor.len()..].starts_with(SEPARATOR)
    }
}
