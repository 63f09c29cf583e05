use std::path::PathBuf;

/// Failure kinds reported by the virtual file system.
///
/// Every variant names the operation (`cd`, `ls`, `cp`, ...) and the offending
/// path: an inner path, or the host path of the archive for `ArchiveIo`. Public functions return `anyhow::Error`;
/// use `err.downcast_ref::<VfsError>()` to inspect the kind.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("{op}: no such file or directory: {path}")]
    NotFound { op: &'static str, path: String },

    #[error("{op}: not a directory: {path}")]
    NotADirectory { op: &'static str, path: String },

    #[error("{op}: already exists: {path}")]
    AlreadyExists { op: &'static str, path: String },

    #[error("{op}: directory not empty: {path}")]
    NotEmpty { op: &'static str, path: String },

    #[error("{op}: invalid argument: {reason}")]
    InvalidArgument { op: &'static str, reason: String },

    #[error("{op}: archive {}: {source}", .path.display())]
    ArchiveIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VfsError {
    pub(crate) fn not_found(op: &'static str, path: impl Into<String>) -> Self {
        VfsError::NotFound { op, path: path.into() }
    }

    pub(crate) fn not_a_directory(op: &'static str, path: impl Into<String>) -> Self {
        VfsError::NotADirectory { op, path: path.into() }
    }

    pub(crate) fn already_exists(op: &'static str, path: impl Into<String>) -> Self {
        VfsError::AlreadyExists { op, path: path.into() }
    }

    pub(crate) fn archive_io(
        op: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        VfsError::ArchiveIo { op, path: path.into(), source }
    }
}
