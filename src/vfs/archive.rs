//! Tar archive that durably backs a `TarFS`.
//!
//! A closed tar stream cannot be extended in place, so every mutation rewrites the
//! whole file: all existing entries are read into memory, re-emitted into a temporary
//! file next to the archive, the new entries are written last, and the temporary file
//! is renamed over the original. A failure at any step leaves the old archive intact.
//!
//! ### Naming convention
//!
//! | inner path | archive name |
//! |------------|--------------|
//! | `/`        | `./`         |
//! | `/a/b` (file) | `a/b`     |
//! | `/a/b` (directory) | `a/b/` |
//!
//! On load every name is normalized back, so archives written by other tools
//! (`/a/b`, `./a/b`, `a/b/`) map to the same inner path.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::core::utils::{self, ROOT, SEPARATOR};
use crate::core::Result;
use crate::error::VfsError;
use crate::vfs::MetadataIndex;
use crate::{EntryType, Metadata};

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// One entry read back from disk, kept verbatim for re-emission.
/// `entry_type` is `None` for kinds the index skips (symlinks, devices).
struct Record {
    inner_path: String,
    entry_type: Option<EntryType>,
    header: tar::Header,
    data: Vec<u8>,
}

pub struct TarArchive {
    path: PathBuf, // host path of the archive file
    filler: u8,    // payload byte for files created without content
}

impl TarArchive {
    pub fn new<P: AsRef<Path>>(path: P, filler: u8) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            filler,
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Writes a brand-new archive containing `entries`.
    /// Fails with `AlreadyExists` if anything occupies the archive path.
    pub fn bootstrap(&self, entries: &[Metadata]) -> Result<()> {
        if self.path.exists() {
            let path = self.path.display().to_string();
            return Err(VfsError::already_exists("open", path).into());
        }
        self.write_atomic("open", true, |builder| {
            for meta in entries {
                self.emit_new(builder, meta)?;
            }
            Ok(())
        })?;
        info!(
            "created archive {} with {} entries",
            self.path.display(),
            entries.len()
        );
        Ok(())
    }

    /// Reads every entry of the archive into a fresh index. Never writes.
    pub fn load(&self) -> Result<MetadataIndex> {
        let io_error = |e| self.io_error("open", e);
        let file = File::open(&self.path).map_err(io_error)?;
        let mut archive = tar::Archive::new(BufReader::new(file));
        let mut index = MetadataIndex::new();

        for entry in archive.entries().map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let inner_path = from_archive_name(&raw_name);

            let Some(entry_type) = classify(entry.header().entry_type(), &raw_name) else {
                warn!(
                    "skipping unsupported entry {:?} ({:?}) in {}",
                    raw_name,
                    entry.header().entry_type(),
                    self.path.display()
                );
                continue;
            };

            let added = index.add(&inner_path, entry.size(), entry_type);
            if !added && !utils::is_virtual_root(&inner_path) {
                warn!(
                    "duplicate entry {} in {}, keeping the first one",
                    inner_path,
                    self.path.display()
                );
            }
        }

        for meta in index.iter() {
            if let Some(parent) = utils::parent(meta.path()) {
                if !index.is_dir(parent) {
                    warn!("{} has no parent directory in the archive", meta.path());
                }
            }
        }

        debug!(
            "loaded archive {} ({} entries)",
            self.path.display(),
            index.len()
        );
        Ok(index)
    }

    /// Rewrites the archive so it holds every existing entry followed by `entries`.
    pub fn append(&self, entries: &[Metadata]) -> Result<()> {
        let records = self.read_records("create")?;
        self.write_atomic("create", false, |builder| {
            for record in &records {
                emit_record(builder, record)?;
            }
            for meta in entries {
                self.emit_new(builder, meta)?;
            }
            Ok(())
        })?;
        debug!(
            "rewrote archive {}: {} kept, {} appended",
            self.path.display(),
            records.len(),
            entries.len()
        );
        Ok(())
    }

    /// Rewrites the archive without the entry stored under `inner_path`.
    pub fn remove(&self, inner_path: &str) -> Result<()> {
        let mut records = self.read_records("rm")?;
        let before = records.len();
        records.retain(|record| record.inner_path != inner_path);
        if records.len() == before {
            return Err(VfsError::not_found("rm", inner_path).into());
        }
        self.write_atomic("rm", false, |builder| {
            for record in &records {
                emit_record(builder, record)?;
            }
            Ok(())
        })?;
        debug!(
            "rewrote archive {}: removed {}",
            self.path.display(),
            inner_path
        );
        Ok(())
    }

    fn read_records(&self, op: &'static str) -> Result<Vec<Record>> {
        let io_error = |e| self.io_error(op, e);
        let file = File::open(&self.path).map_err(io_error)?;
        let mut archive = tar::Archive::new(BufReader::new(file));
        let mut records = Vec::new();

        for entry in archive.entries().map_err(io_error)? {
            let mut entry = entry.map_err(io_error)?;
            let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let inner_path = from_archive_name(&raw_name);
            let entry_type = classify(entry.header().entry_type(), &raw_name);
            let header = entry.header().clone();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(io_error)?;
            records.push(Record {
                inner_path,
                entry_type,
                header,
                data,
            });
        }
        Ok(records)
    }

    /// Builds the archive in a temporary file beside the target and renames it into place.
    /// With `no_clobber` the rename fails if the target appeared in the meantime.
    fn write_atomic<F>(&self, op: &'static str, no_clobber: bool, fill: F) -> Result<()>
    where
        F: FnOnce(&mut tar::Builder<BufWriter<&File>>) -> io::Result<()>,
    {
        let io_error = |e| self.io_error(op, e);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir).map_err(io_error)?;

        {
            let mut builder = tar::Builder::new(BufWriter::new(tmp.as_file()));
            fill(&mut builder).map_err(io_error)?;
            let writer = builder.into_inner().map_err(io_error)?;
            writer.into_inner().map_err(|e| io_error(e.into_error()))?;
        }
        tmp.as_file().sync_all().map_err(io_error)?;

        let persisted = if no_clobber {
            tmp.persist_noclobber(&self.path)
        } else {
            tmp.persist(&self.path)
        };
        persisted.map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                VfsError::already_exists(op, self.path.display().to_string())
            } else {
                io_error(e.error)
            }
        })?;
        Ok(())
    }

    fn emit_new(
        &self,
        builder: &mut tar::Builder<BufWriter<&File>>,
        meta: &Metadata,
    ) -> io::Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        let name = to_archive_name(meta.path(), meta.entry_type());
        match meta.entry_type() {
            EntryType::Directory => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(DIR_MODE);
                header.set_size(0);
                builder.append_data(&mut header, name, io::empty())
            }
            EntryType::File => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(FILE_MODE);
                header.set_size(meta.size());
                let payload = io::repeat(self.filler).take(meta.size());
                builder.append_data(&mut header, name, payload)
            }
        }
    }

    fn io_error(&self, op: &'static str, source: io::Error) -> VfsError {
        VfsError::archive_io(op, &self.path, source)
    }
}

/// Writes a previously read entry back with its original header and content.
/// Only the name is re-rendered, in the canonical form for the kind the entry loaded as.
fn emit_record(builder: &mut tar::Builder<BufWriter<&File>>, record: &Record) -> io::Result<()> {
    let entry_type = record.entry_type.unwrap_or(EntryType::File);
    let name = to_archive_name(&record.inner_path, entry_type);
    let mut header = record.header.clone();
    builder.append_data(&mut header, name, record.data.as_slice())
}

fn classify(entry_type: tar::EntryType, raw_name: &str) -> Option<EntryType> {
    match entry_type {
        tar::EntryType::Directory => Some(EntryType::Directory),
        // pre-POSIX archives mark directories only with a trailing slash
        tar::EntryType::Regular if raw_name.ends_with(SEPARATOR) => Some(EntryType::Directory),
        tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
            Some(EntryType::File)
        }
        _ => None,
    }
}

/// Maps an inner canonical path to the name stored in the archive.
pub fn to_archive_name(inner_path: &str, entry_type: EntryType) -> String {
    if utils::is_virtual_root(inner_path) {
        return "./".to_string();
    }
    let relative = inner_path.trim_start_matches(SEPARATOR);
    match entry_type {
        EntryType::Directory => format!("{relative}{SEPARATOR}"),
        EntryType::File => relative.to_string(),
    }
}

/// Maps any archive entry name back to an inner canonical path.
pub fn from_archive_name(name: &str) -> String {
    utils::normalize(name, ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn bootstrap_set() -> Vec<Metadata> {
        vec![
            Metadata::new("/", 0, EntryType::Directory),
            Metadata::new("/hello", 0, EntryType::File),
            Metadata::new("/dir", 0, EntryType::Directory),
            Metadata::new("/dir/file", 0, EntryType::File),
        ]
    }

    /// Raw (name, type, size, content) tuples straight from the tar stream.
    fn raw_entries(path: &Path) -> Vec<(String, tar::EntryType, u64, Vec<u8>)> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                let entry_type = entry.header().entry_type();
                let size = entry.size();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (name, entry_type, size, data)
            })
            .collect()
    }

    mod naming {
        use super::*;

        #[test]
        fn test_to_archive_name() {
            assert_eq!(to_archive_name("/", EntryType::Directory), "./");
            assert_eq!(to_archive_name("/hello", EntryType::File), "hello");
            assert_eq!(to_archive_name("/dir", EntryType::Directory), "dir/");
            assert_eq!(to_archive_name("/dir/file", EntryType::File), "dir/file");
        }

        #[test]
        fn test_from_archive_name() {
            assert_eq!(from_archive_name("./"), "/");
            assert_eq!(from_archive_name("."), "/");
            assert_eq!(from_archive_name("/"), "/");
            assert_eq!(from_archive_name("hello"), "/hello");
            assert_eq!(from_archive_name("/hello"), "/hello");
            assert_eq!(from_archive_name("./dir/"), "/dir");
            assert_eq!(from_archive_name("dir/file"), "/dir/file");
        }
    }

    mod bootstrap {
        use super::*;

        #[test]
        fn test_bootstrap_writes_entries() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);

            archive.bootstrap(&bootstrap_set())?;

            let names: Vec<_> = raw_entries(&path)
                .into_iter()
                .map(|(name, entry_type, _, _)| (name, entry_type))
                .collect();
            assert_eq!(
                names,
                vec![
                    ("./".to_string(), tar::EntryType::Directory),
                    ("hello".to_string(), tar::EntryType::Regular),
                    ("dir/".to_string(), tar::EntryType::Directory),
                    ("dir/file".to_string(), tar::EntryType::Regular),
                ]
            );
            Ok(())
        }

        #[test]
        fn test_bootstrap_refuses_existing_file() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            std::fs::write(&path, b"occupied")?;

            let err = TarArchive::new(&path, 0)
                .bootstrap(&bootstrap_set())
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<VfsError>(),
                Some(VfsError::AlreadyExists { .. })
            ));
            // the occupant is untouched
            assert_eq!(std::fs::read(&path)?, b"occupied");
            Ok(())
        }
    }

    mod load {
        use super::*;

        #[test]
        fn test_load_round_trip() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);
            archive.bootstrap(&bootstrap_set())?;

            let index = archive.load()?;
            assert_eq!(index.len(), 4);
            assert!(index.is_dir("/"));
            assert!(index.is_dir("/dir"));
            assert!(index.get("/hello")?.is_file());
            assert!(index.get("/dir/file")?.is_file());
            Ok(())
        }

        #[test]
        fn test_load_foreign_names() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("foreign.tar");

            // names in the styles other tar writers use
            let mut builder = tar::Builder::new(File::create(&path)?);
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            builder.append_data(&mut header, "./docs/", io::empty())?;
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(3);
            builder.append_data(&mut header, "./docs/a.txt", &b"abc"[..])?;
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_link_name("a.txt")?;
            builder.append_data(&mut header, "docs/link", io::empty())?;
            builder.finish()?;

            let index = TarArchive::new(&path, 0).load()?;
            assert!(index.is_dir("/docs"));
            assert_eq!(index.get("/docs/a.txt")?.size(), 3);
            // symlinks are not supported and are skipped
            assert!(!index.exists("/docs/link"));
            Ok(())
        }

        #[test]
        fn test_load_missing_archive_is_io_error() {
            let tmp = TempDir::new("archive_test").unwrap();
            let err = TarArchive::new(tmp.path().join("nope.tar"), 0)
                .load()
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<VfsError>(),
                Some(VfsError::ArchiveIo { op: "open", .. })
            ));
        }

        #[test]
        fn test_load_does_not_write() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);
            archive.bootstrap(&bootstrap_set())?;

            let before = std::fs::read(&path)?;
            archive.load()?;
            assert_eq!(std::fs::read(&path)?, before);
            Ok(())
        }
    }

    mod append {
        use super::*;

        #[test]
        fn test_append_keeps_prior_entries_and_adds_last() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);
            archive.bootstrap(&bootstrap_set())?;

            archive.append(&[Metadata::new("/dir1", 0, EntryType::Directory)])?;
            archive.append(&[Metadata::new("/dir1/data", 4, EntryType::File)])?;

            let names: Vec<_> = raw_entries(&path)
                .into_iter()
                .map(|(name, _, _, _)| name)
                .collect();
            assert_eq!(
                names,
                vec!["./", "hello", "dir/", "dir/file", "dir1/", "dir1/data"]
            );
            Ok(())
        }

        #[test]
        fn test_append_writes_filler_payload() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, b'x');
            archive.bootstrap(&bootstrap_set())?;

            archive.append(&[Metadata::new("/big", 1000, EntryType::File)])?;

            let (_, _, size, data) = raw_entries(&path).pop().unwrap();
            assert_eq!(size, 1000);
            assert_eq!(data, vec![b'x'; 1000]);
            Ok(())
        }

        #[test]
        fn test_append_preserves_prior_content() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, b'x');
            archive.bootstrap(&[
                Metadata::new("/", 0, EntryType::Directory),
                Metadata::new("/a", 3, EntryType::File),
            ])?;

            TarArchive::new(&path, b'y').append(&[Metadata::new("/b", 2, EntryType::File)])?;

            let entries = raw_entries(&path);
            assert_eq!(entries[1].3, b"xxx");
            assert_eq!(entries[2].3, b"yy");
            Ok(())
        }

        #[test]
        fn test_append_long_name() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);
            archive.bootstrap(&bootstrap_set())?;

            let long = format!("/{}", "n".repeat(150));
            archive.append(&[Metadata::new(long.as_str(), 0, EntryType::File)])?;
            archive.append(&[Metadata::new("/after", 0, EntryType::File)])?;

            let index = archive.load()?;
            assert!(index.exists(&long));
            assert!(index.exists("/after"));
            Ok(())
        }

        #[test]
        fn test_append_keeps_pre_posix_directories() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("v7.tar");

            // old-style headers mark a directory only by its trailing slash
            let mut builder = tar::Builder::new(File::create(&path)?);
            let mut header = tar::Header::new_old();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(0);
            builder.append_data(&mut header, "old/", io::empty())?;
            let mut header = tar::Header::new_old();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(2);
            builder.append_data(&mut header, "old/inner", &b"ab"[..])?;
            builder.finish()?;

            let archive = TarArchive::new(&path, 0);
            assert!(archive.load()?.is_dir("/old"));

            archive.append(&[Metadata::new("/old/child", 0, EntryType::File)])?;

            let index = archive.load()?;
            assert!(index.is_dir("/old"));
            assert_eq!(index.get("/old/inner")?.size(), 2);
            assert!(index.get("/old/child")?.is_file());
            let names: Vec<_> = raw_entries(&path)
                .into_iter()
                .map(|(name, _, _, _)| name)
                .collect();
            assert_eq!(names, vec!["old/", "old/inner", "old/child"]);
            Ok(())
        }

        #[test]
        fn test_append_to_missing_archive_fails_without_creating_it() {
            let tmp = TempDir::new("archive_test").unwrap();
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);

            let result = archive.append(&[Metadata::new("/x", 0, EntryType::File)]);
            assert!(result.is_err());
            assert!(!path.exists());
        }
    }

    mod remove {
        use super::*;

        #[test]
        fn test_remove_drops_single_entry() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);
            archive.bootstrap(&bootstrap_set())?;

            archive.remove("/hello")?;

            let index = archive.load()?;
            assert!(!index.exists("/hello"));
            assert!(index.exists("/dir/file"));
            Ok(())
        }

        #[test]
        fn test_remove_missing_entry() -> Result<()> {
            let tmp = TempDir::new("archive_test")?;
            let path = tmp.path().join("fs.tar");
            let archive = TarArchive::new(&path, 0);
            archive.bootstrap(&bootstrap_set())?;

            let err = archive.remove("/nope").unwrap_err();
            assert!(matches!(
                err.downcast_ref::<VfsError>(),
                Some(VfsError::NotFound { .. })
            ));
            Ok(())
        }
    }
}
