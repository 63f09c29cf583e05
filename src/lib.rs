//! A virtual file system (VFS) whose only durable storage is a single tar archive.
//!
//! ### Overview
//!
//! `vfs-tar` keeps a flat, ordered in-memory index of every file and directory and writes
//! each change straight through to a tar archive on the host. Queries (`ls`, `cd`, `exists`,
//! `metadata`, `tree`, `find`) never touch the disk; mutations (`create`, `copy`, `rm`)
//! rewrite the archive before they return.
//!
//! **Key ideas**:
//! - **One file**: the whole tree lives in a standard tar archive readable by any `tar` tool.
//! - **Consistency**: the index and the archive are updated together or not at all.
//!   Rewrites go through a temporary file and an atomic rename.
//! - **POSIX‑like paths**: `/`-separated, absolute or relative to the current directory,
//!   with `.` and `..` resolved.
//! - **Bookkeeping only**: files carry a declared size, not user content.
//!
//! ### Example
//!
//! ```no_run
//! use vfs_tar::{EntryType, FsBackend, TarFS};
//!
//! let mut fs = TarFS::bootstrap("/tmp/example.tar").unwrap();
//! fs.create("/dir1", 0, EntryType::Directory).unwrap();
//! assert_eq!(fs.copy("/hello", "/dir1").unwrap(), "/dir1/hello");
//! print!("{}", fs.tree("/"));
//! ```

mod core;
mod error;
mod vfs;

pub use crate::core::{FsBackend, Result, utils};
pub use crate::error::VfsError;
pub use crate::vfs::{EntryType, Metadata, MetadataIndex, TarArchive, TarFS, TarFSOptions};
