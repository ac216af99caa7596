//! # Content Hasher
//!
//! Streams a local file through MD5 in fixed-size blocks. The lowercase hex
//! digest is the dedup key and the content tag declared to the remote store.

use crate::error::Result;
use bridge_traits::LocalFilesystem;
use core_runtime::logging::strip_path;
use md5::{Digest, Md5};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Default read block size (64 KiB).
pub const DEFAULT_HASH_BLOCK_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct ContentHasher {
    fs: Arc<dyn LocalFilesystem>,
    block_size: usize,
}

impl ContentHasher {
    pub fn new(fs: Arc<dyn LocalFilesystem>, block_size: usize) -> Self {
        Self {
            fs,
            block_size: block_size.max(1),
        }
    }

    /// Hash a file without holding more than one block in memory.
    ///
    /// # Errors
    ///
    /// `NotFound` if the path is missing, `IoFailure` if it cannot be read.
    #[instrument(skip(self, path), fields(file = %strip_path(&path.to_string_lossy())))]
    pub async fn hash(&self, path: &Path) -> Result<String> {
        let mut reader = self.fs.open_read_stream(path).await?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; self.block_size];
        let mut total = 0u64;

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            total += read as u64;
        }

        let digest = hex::encode(hasher.finalize());
        debug!(bytes = total, digest = %digest, "Hashed file");
        Ok(digest)
    }

    /// Digest of an in-memory buffer, identical to what [`hash`](Self::hash)
    /// returns for a file with the same bytes.
    pub fn digest_bytes(bytes: &[u8]) -> String {
        hex::encode(Md5::digest(bytes))
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("block_size", &self.block_size)
            .finish()
    }
}
