mod archive;
mod entry;
mod index;
mod tar_fs;
pub(crate) mod traverse;

pub use archive::TarArchive;
pub use entry::{EntryType, Metadata};
pub use index::MetadataIndex;
pub use tar_fs::{TarFS, TarFSOptions};
