//! Remote Object Store Abstraction
//!
//! Shapes of the session-based cloud storage API the transfer engine drives.
//! The wire protocol, authentication and request signing live entirely in
//! the implementing provider crate.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Byte stream returned by ranged and full-object reads.
pub type ByteStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// One entry of a remote folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub is_directory: bool,
    /// Hex content digest as reported by the store (folders have none).
    pub digest: Option<String>,
    pub size: u64,
    /// Opaque provider value needed to resolve a download link
    #[serde(default)]
    pub storage_tag: Option<String>,
}

impl RemoteEntry {
    /// True when this entry is a file with `name` whose digest equals `digest`,
    /// compared case-insensitively.
    pub fn matches_content(&self, name: &str, digest: &str) -> bool {
        !self.is_directory
            && self.name == name
            && self
                .digest
                .as_deref()
                .is_some_and(|remote| remote.eq_ignore_ascii_case(digest))
    }
}

/// How the store should treat a same-named object in the target folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMode {
    /// Report a conflict and do nothing.
    Reject,
    /// Let the store assign a disambiguated name.
    KeepBoth,
    /// Replace the existing object.
    Overwrite,
}

/// Declaration sent when opening an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDeclaration {
    pub parent_id: String,
    pub name: String,
    pub size: u64,
    pub digest: String,
    pub duplicate: DuplicateMode,
}

/// Coordinates of an open multipart upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCoordinates {
    pub file_id: String,
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub storage_node: String,
}

/// Result of [`RemoteStore::begin_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginUpload {
    /// The store already holds identical content; nothing to transfer.
    Reused { file_id: Option<String> },
    /// A same-named object exists and the declaration used `DuplicateMode::Reject`.
    Conflict,
    /// A multipart session was opened.
    Session(UploadCoordinates),
}

/// Remote store trait
///
/// Every method is a single remote round-trip. Implementations report
/// transport failures as `BridgeError::OperationFailed` and non-success
/// statuses as `BridgeError::Rejected`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the immediate children of a folder.
    async fn list_directory(&self, folder_id: &str) -> Result<Vec<RemoteEntry>>;

    /// Create a folder. With `fail_if_exists = false` an existing folder of the
    /// same name is returned instead.
    async fn create_folder(&self, parent_id: &str, name: &str, fail_if_exists: bool)
        -> Result<String>;

    /// Always create a new folder. If the name is taken the store assigns a
    /// disambiguated one.
    async fn create_new_folder(&self, parent_id: &str, name: &str) -> Result<String>;

    /// Declare an upload and open a session if content must be transferred.
    async fn begin_upload(&self, declaration: &UploadDeclaration) -> Result<BeginUpload>;

    /// Issue a single-use URL for one part (1-based part number).
    async fn issue_part_url(&self, session: &UploadCoordinates, part_number: u32) -> Result<String>;

    /// Transfer one part's bytes to a URL from [`issue_part_url`](Self::issue_part_url).
    async fn put_part(&self, url: &str, bytes: Bytes) -> Result<()>;

    /// Assemble uploaded parts into the final object.
    async fn complete_upload(&self, session: &UploadCoordinates) -> Result<()>;

    /// Close the upload for `file_id`.
    async fn finalize(&self, file_id: &str) -> Result<()>;

    /// Delete an object (file or folder) by id.
    async fn delete_object(&self, id: &str) -> Result<()>;

    /// Read the inclusive byte range `start..=end` of a resource.
    async fn ranged_get(&self, url: &str, start: u64, end: u64) -> Result<ByteStream>;

    /// Read a whole resource as one stream.
    async fn get(&self, url: &str) -> Result<ByteStream>;

    /// Size of a resource, or `None` when the store cannot tell.
    async fn probe_size(&self, url: &str) -> Result<Option<u64>>;

    /// Turn a listed entry into a URL for [`ranged_get`](Self::ranged_get)
    /// and [`get`](Self::get). Folders resolve to an archive of their content.
    async fn resolve_download_url(&self, entry: &RemoteEntry) -> Result<String>;
}
