#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

/// Record describing one filesystem object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    path: String,
    size: u64,
    entry_type: EntryType,
}

impl Metadata {
    pub fn new<S: Into<String>>(path: S, size: u64, entry_type: EntryType) -> Metadata {
        Metadata {
            path: path.into(),
            size,
            entry_type,
        }
    }

    /// Inner absolute canonical path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared size in bytes (always 0 for directories created by the VFS).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}
