//! Thin blocking interface over the distributed file store.
//!
//! All higher layers talk to the store through the [`Dfs`] trait: plain
//! path-based operations with file-handle lifecycle, offset bookkeeping, and
//! short-write retries hidden inside the adapter. Errors surface as a single
//! opaque `Error::IO` kind with context; the adapter does not classify them.

pub mod local;

pub use local::LocalDfs;

use std::path::Path;

use crate::error::Result;

/// Size and kind of a file-store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
}

/// Blocking file-store primitives.
///
/// `append` and `overwrite_all` are write-through: on successful return the
/// bytes are durable. Both loop internally until every byte is written or an
/// error is returned, so partial writes are never observable to callers.
pub trait Dfs: Send + Sync {
    /// Creates a new file. Fails if the file already exists. When `init_size`
    /// is nonzero the file is zero-filled to that many bytes.
    fn create(&self, path: &Path, init_size: u64) -> Result<()>;

    /// Reads the entire file.
    fn read_all(&self, path: &Path) -> Result<Vec<u8>>;

    /// Appends bytes at the end of the file, durably.
    fn append(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Replaces the file content, durably. Truncates first when the new
    /// content is shorter than the existing file.
    fn overwrite_all(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Removes a file.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Creates a directory, including missing parents.
    fn mkdir(&self, path: &Path) -> Result<()>;

    /// Returns the names of all entries in the directory in ascending
    /// lexicographic order. Names are not padded, so callers comparing
    /// numeric filenames must convert to integers first.
    fn list_sorted(&self, path: &Path) -> Result<Vec<String>>;

    /// Stats a file or directory.
    fn stat(&self, path: &Path) -> Result<FileStat>;
}
