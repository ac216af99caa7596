//! Local Filesystem Abstraction
//!
//! The transfer engine never touches `std::fs` directly; every local read,
//! write and directory walk goes through [`LocalFilesystem`] so hosts can
//! substitute sandboxed or in-memory implementations.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    /// `is_directory` and `size` describe the link target; this flag tells
    /// the walk not to descend through it.
    pub is_symlink: bool,
    pub is_directory: bool,
}

/// Boxed reader handed out by [`LocalFilesystem::open_read_stream`].
pub type ReadStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Boxed writer handed out by [`LocalFilesystem::open_write_stream`].
pub type WriteStream = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

/// Local file system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::LocalFilesystem;
///
/// async fn file_size(fs: &dyn LocalFilesystem, path: &Path) -> Result<u64> {
///     Ok(fs.metadata(path).await?.size)
/// }
/// ```
#[async_trait]
pub trait LocalFilesystem: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory, following symlinks
    ///
    /// Returns `BridgeError::NotFound` when the path (or a link's target)
    /// does not exist.
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List the immediate entries of a directory, sorted by path
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for sequential reading
    async fn open_read_stream(&self, path: &Path) -> Result<ReadStream>;

    /// Create (or truncate) a file for sequential writing
    async fn open_write_stream(&self, path: &Path) -> Result<WriteStream>;
}
