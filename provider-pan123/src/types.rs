//! 123pan API request and response types
//!
//! Responses share one envelope, `{ code, message, data }`, with `code == 0`
//! meaning success. Listing payloads use PascalCase keys; request bodies use
//! camelCase, with a few PascalCase exceptions the API insists on.

use crate::error::{PanError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{DuplicateMode, RemoteEntry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Common response envelope
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,

    #[serde(default)]
    pub message: String,

    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T: DeserializeOwned> ApiEnvelope<T> {
    /// Payload of a successful response.
    pub fn into_data(self) -> Result<T> {
        if self.code != 0 {
            return Err(PanError::ApiError {
                code: self.code,
                message: self.message,
            });
        }
        self.data
            .ok_or_else(|| PanError::MissingField("data".to_string()))
    }
}

/// `Type` value of folders in listings and upload requests
pub const TYPE_FOLDER: u8 = 1;
pub const TYPE_FILE: u8 = 0;

/// One listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileInfo {
    pub file_id: i64,

    pub file_name: String,

    /// 1 for folders, 0 for files
    #[serde(rename = "Type")]
    pub kind: u8,

    /// MD5 of the content, empty for folders
    #[serde(default)]
    pub etag: String,

    #[serde(default)]
    pub size: u64,

    /// Storage flag `download_info` wants echoed back
    #[serde(rename = "S3KeyFlag", default)]
    pub s3_key_flag: String,
}

impl FileInfo {
    pub fn is_folder(&self) -> bool {
        self.kind == TYPE_FOLDER
    }

    pub fn into_remote_entry(self) -> RemoteEntry {
        let is_directory = self.is_folder();
        RemoteEntry {
            id: self.file_id.to_string(),
            name: self.file_name,
            is_directory,
            digest: if self.etag.is_empty() {
                None
            } else {
                Some(self.etag)
            },
            size: self.size,
            storage_tag: Some(self.s3_key_flag).filter(|flag| !flag.is_empty()),
        }
    }
}

/// `file/list/new` payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileListData {
    #[serde(default)]
    pub info_list: Vec<FileInfo>,

    /// Entries across all pages
    #[serde(default)]
    pub total: u64,
}

/// `file/upload_request` body, shared by file declarations and folder creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequestBody {
    pub drive_id: u8,
    pub etag: String,
    pub file_name: String,
    pub parent_file_id: i64,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: u8,
    pub duplicate: u8,

    #[serde(rename = "NotReuse", skip_serializing_if = "Option::is_none")]
    pub not_reuse: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub operate_type: Option<u8>,
}

impl UploadRequestBody {
    pub fn file(parent_file_id: i64, name: &str, size: u64, etag: &str, duplicate: DuplicateMode) -> Self {
        Self {
            drive_id: 0,
            etag: etag.to_string(),
            file_name: name.to_string(),
            parent_file_id,
            size,
            kind: TYPE_FILE,
            duplicate: duplicate_code(duplicate),
            not_reuse: None,
            event: None,
            operate_type: None,
        }
    }

    pub fn folder(parent_file_id: i64, name: &str, duplicate: DuplicateMode) -> Self {
        Self {
            drive_id: 0,
            etag: String::new(),
            file_name: name.to_string(),
            parent_file_id,
            size: 0,
            kind: TYPE_FOLDER,
            duplicate: duplicate_code(duplicate),
            not_reuse: Some(true),
            event: Some("newCreateFolder".to_string()),
            operate_type: Some(1),
        }
    }
}

/// Wire value of the `duplicate` field
pub fn duplicate_code(mode: DuplicateMode) -> u8 {
    match mode {
        DuplicateMode::Reject => 0,
        DuplicateMode::KeepBoth => 1,
        DuplicateMode::Overwrite => 2,
    }
}

/// `file/upload_request` payload
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UploadRequestData {
    /// Content already stored; no bytes need to be sent
    pub reuse: bool,
    pub file_id: i64,
    pub bucket: String,
    pub storage_node: String,
    pub key: String,
    pub upload_id: String,
    /// Present on folder creation
    pub info: Option<FileInfo>,
}

/// Identifies a multipart session in the S3-style endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub storage_node: String,
}

/// `s3_repare_upload_parts_batch` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBatchBody {
    pub bucket: String,
    pub key: String,
    pub part_number_start: u32,
    /// Exclusive
    pub part_number_end: u32,
    pub upload_id: String,
    #[serde(rename = "StorageNode")]
    pub storage_node: String,
}

/// `s3_repare_upload_parts_batch` payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBatchData {
    /// Part number (as a string) to single-use upload URL
    #[serde(default)]
    pub presigned_urls: HashMap<String, String>,
}

/// `upload_complete` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    pub file_id: i64,
}

/// `file/trash` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashBody {
    pub drive_id: u8,
    pub file_trash_info_list: Vec<TrashEntry>,
    /// true trashes, false restores
    pub operation: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrashEntry {
    pub file_id: i64,
}

/// `download_info` body for one file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfoBody {
    pub drive_id: u8,
    pub etag: String,
    pub file_id: i64,
    #[serde(rename = "s3keyFlag")]
    pub s3_key_flag: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub file_name: String,
    pub size: u64,
}

/// `batch_download_info` body; a folder comes back as one archive
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDownloadBody {
    pub file_id_list: Vec<DownloadRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRef {
    pub file_id: i64,
}

/// `download_info` / `batch_download_info` payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownloadInfoData {
    pub download_url: String,
}

/// Payload of the link behind `DownloadUrl`
#[derive(Debug, Deserialize)]
pub struct RedirectData {
    pub redirect_url: String,
}

/// `DownloadUrl` carries the real link base64-encoded in its `params` value,
/// which runs up to the last `&`.
pub fn unwrap_download_url(download_url: &str) -> Result<String> {
    const MARKER: &str = "params=";
    let start = download_url
        .find(MARKER)
        .ok_or_else(|| PanError::MissingField("DownloadUrl params".to_string()))?
        + MARKER.len();
    let rest = &download_url[start..];
    let encoded = rest.rfind('&').map_or(rest, |end| &rest[..end]);

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| PanError::ParseError(format!("Invalid download params: {}", e)))?;
    String::from_utf8(decoded)
        .map_err(|e| PanError::ParseError(format!("Download link is not UTF-8: {}", e)))
}

/// Remote ids are decimal integers on the wire.
pub fn parse_id(id: &str) -> Result<i64> {
    id.trim()
        .parse()
        .map_err(|_| PanError::ParseError(format!("Invalid file id: {}", id)))
}
