//! 123pan web API connector
//!
//! Implements `RemoteStore` on top of the host's `HttpClient`.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::remote::{
    BeginUpload, ByteStream, DuplicateMode, RemoteEntry, RemoteStore, UploadCoordinates,
    UploadDeclaration,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::PanError;
use crate::signer::{NoopSigner, RequestSigner};
use crate::types::{
    parse_id, unwrap_download_url, ApiEnvelope, BatchDownloadBody, CompleteBody,
    DownloadInfoBody, DownloadInfoData, DownloadRef, FileInfo, FileListData, PartBatchBody,
    PartBatchData, RedirectData, SessionBody, TrashBody, TrashEntry, UploadRequestBody,
    UploadRequestData, TYPE_FILE,
};

/// 123pan web API base URL
pub const API_BASE: &str = "https://www.123pan.com";

/// Envelope code for "an object with this name already exists"
pub const CONFLICT_CODE: i64 = 5060;

/// Envelope code the listing endpoint uses when throttling
const THROTTLED_CODE: i64 = 403;

/// Listing page size (API maximum)
const MAX_PAGE_SIZE: u32 = 100;

const LIST_PATH: &str = "/b/api/file/list/new";
const MKDIR_PATH: &str = "/a/api/file/upload_request";
const UPLOAD_REQUEST_PATH: &str = "/b/api/file/upload_request";
const PART_URLS_PATH: &str = "/b/api/file/s3_repare_upload_parts_batch";
const LIST_PARTS_PATH: &str = "/b/api/file/s3_list_upload_parts";
const COMPLETE_MULTIPART_PATH: &str = "/b/api/file/s3_complete_multipart_upload";
const CLOSE_UPLOAD_PATH: &str = "/b/api/file/upload_complete";
const TRASH_PATH: &str = "/a/api/file/trash";
const DOWNLOAD_INFO_PATH: &str = "/a/api/file/download_info";
const BATCH_DOWNLOAD_INFO_PATH: &str = "/a/api/file/batch_download_info";

/// Connection settings for [`Pan123Store`].
#[derive(Debug, Clone)]
pub struct Pan123Config {
    pub base_url: String,
    pub access_token: String,
    pub page_size: u32,
    /// Pause after the listing endpoint throttles
    pub throttle_delay: Duration,
    pub max_throttle_retries: u32,
    pub request_timeout: Duration,
    /// Transport-level retry handed to the `HttpClient`
    pub http_retry: RetryPolicy,
}

impl Pan123Config {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: API_BASE.to_string(),
            access_token: access_token.into(),
            page_size: MAX_PAGE_SIZE,
            throttle_delay: Duration::from_secs(20),
            max_throttle_retries: 5,
            request_timeout: Duration::from_secs(30),
            http_retry: RetryPolicy::no_retry(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_throttle(mut self, delay: Duration, max_retries: u32) -> Self {
        self.throttle_delay = delay;
        self.max_throttle_retries = max_retries;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_http_retry(mut self, policy: RetryPolicy) -> Self {
        self.http_retry = policy;
        self
    }
}

/// 123pan remote store
///
/// # Features
///
/// - Paginated listing that waits out throttling
/// - Folder lookup-or-create
/// - Multipart uploads through single-use presigned part URLs
/// - Deletion via the trash endpoint
/// - Download link resolution, then ranged downloads of the resolved URL
///
/// # Example
///
/// ```ignore
/// use provider_pan123::{Pan123Config, Pan123Store};
///
/// let store = Pan123Store::new(http_client, Pan123Config::new(token));
/// let children = store.list_directory("0").await?;
/// ```
pub struct Pan123Store {
    http: Arc<dyn HttpClient>,
    config: Pan123Config,
    signer: Arc<dyn RequestSigner>,
}

impl Pan123Store {
    pub fn new(http: Arc<dyn HttpClient>, config: Pan123Config) -> Self {
        Self {
            http,
            config,
            signer: Arc::new(NoopSigner),
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn config(&self) -> &Pan123Config {
        &self.config
    }

    /// Authenticated request against an API path.
    fn api_request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        let mut request = HttpRequest::new(method, format!("{}{}", self.config.base_url, path));
        if let Some((name, value)) = self.signer.sign(path) {
            request = request.query(&name, urlencoding::encode(&value));
        }
        request
            .bearer_token(self.config.access_token.as_str())
            .header("Accept", "application/json")
            .header("platform", "web")
            .header("App-Version", "3")
            .timeout(self.config.request_timeout)
    }

    fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest> {
        self.api_request(HttpMethod::Post, path).json(body)
    }

    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, PanError> {
        let response = self
            .http
            .execute_with_retry(request, self.config.http_retry.clone())
            .await?;

        if !response.is_success() {
            warn!("123pan request failed: status={}", response.status);
            return Err(PanError::HttpError {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            });
        }
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(
        response: &HttpResponse,
    ) -> std::result::Result<ApiEnvelope<T>, PanError> {
        serde_json::from_slice(&response.body)
            .map_err(|e| PanError::ParseError(format!("Failed to parse envelope: {}", e)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<T, PanError> {
        let response = self.execute(request).await?;
        Self::decode::<T>(&response)?.into_data()
    }

    /// Send a request whose payload is irrelevant; only the envelope code counts.
    async fn send_ack(&self, request: HttpRequest) -> std::result::Result<(), PanError> {
        let response = self.execute(request).await?;
        let envelope = Self::decode::<serde_json::Value>(&response)?;
        if envelope.code != 0 {
            return Err(PanError::ApiError {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(())
    }

    /// Fetch one listing page, sleeping through throttling.
    async fn list_page(
        &self,
        folder_id: i64,
        page: u32,
    ) -> std::result::Result<FileListData, PanError> {
        let mut throttled = 0u32;

        loop {
            let request = self
                .api_request(HttpMethod::Get, LIST_PATH)
                .query("driveId", 0)
                .query("limit", self.config.page_size)
                .query("next", 0)
                .query("orderBy", "file_id")
                .query("orderDirection", "desc")
                .query("parentFileId", folder_id)
                .query("trashed", false)
                .query("Page", page);

            let response = self
                .http
                .execute_with_retry(request, self.config.http_retry.clone())
                .await?;

            let throttled_now = if response.status == 403 || response.status == 429 {
                true
            } else if !response.is_success() {
                return Err(PanError::HttpError {
                    status: response.status,
                    message: String::from_utf8_lossy(&response.body).to_string(),
                });
            } else {
                let envelope = Self::decode::<FileListData>(&response)?;
                if envelope.code == THROTTLED_CODE {
                    true
                } else {
                    return envelope.into_data();
                }
            };

            if throttled_now {
                throttled += 1;
                if throttled > self.config.max_throttle_retries {
                    return Err(PanError::RateLimited {
                        attempts: throttled,
                    });
                }
                warn!(
                    "Listing throttled (attempt {}/{}), sleeping {:?}",
                    throttled, self.config.max_throttle_retries, self.config.throttle_delay
                );
                tokio::time::sleep(self.config.throttle_delay).await;
            }
        }
    }

    async fn list_all(&self, folder_id: i64) -> std::result::Result<Vec<FileInfo>, PanError> {
        let mut entries = Vec::new();
        let mut page = 1;

        loop {
            let data = self.list_page(folder_id, page).await?;
            let received = data.info_list.len();
            entries.extend(data.info_list);
            debug!(
                "Listed page {} of folder {}: {} entries ({} of {})",
                page,
                folder_id,
                received,
                entries.len(),
                data.total
            );

            if received == 0 || entries.len() as u64 >= data.total {
                return Ok(entries);
            }
            page += 1;
        }
    }

    async fn mkdir(&self, parent: i64, name: &str, duplicate: DuplicateMode) -> Result<String> {
        let request = self.post_json(MKDIR_PATH, &UploadRequestBody::folder(parent, name, duplicate))?;
        let data = match self.send::<UploadRequestData>(request).await {
            Err(PanError::ApiError {
                code: CONFLICT_CODE,
                ..
            }) => return Err(PanError::NameConflict(name.to_string()).into()),
            other => other?,
        };

        let id = data
            .info
            .map(|info| info.file_id)
            .filter(|id| *id != 0)
            .or(Some(data.file_id).filter(|id| *id != 0))
            .ok_or_else(|| PanError::MissingField("Info.FileId".to_string()))?;

        info!("Created folder {} ({})", name, id);
        Ok(id.to_string())
    }

    fn session_body(session: &UploadCoordinates) -> SessionBody {
        SessionBody {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            upload_id: session.upload_id.clone(),
            storage_node: session.storage_node.clone(),
        }
    }
}

#[async_trait]
impl RemoteStore for Pan123Store {
    #[instrument(skip(self))]
    async fn list_directory(&self, folder_id: &str) -> Result<Vec<RemoteEntry>> {
        let id = parse_id(folder_id)?;
        let entries = self.list_all(id).await?;
        info!("Listed {} entries in folder {}", entries.len(), folder_id);

        Ok(entries
            .into_iter()
            .map(FileInfo::into_remote_entry)
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_folder(&self, parent_id: &str, name: &str, fail_if_exists: bool) -> Result<String> {
        let parent = parse_id(parent_id)?;

        let duplicate = if fail_if_exists {
            DuplicateMode::Reject
        } else {
            let existing = self
                .list_all(parent)
                .await?
                .into_iter()
                .find(|entry| entry.is_folder() && entry.file_name == name);
            if let Some(folder) = existing {
                debug!("Reusing folder {} ({})", name, folder.file_id);
                return Ok(folder.file_id.to_string());
            }
            DuplicateMode::KeepBoth
        };

        self.mkdir(parent, name, duplicate).await
    }

    #[instrument(skip(self))]
    async fn create_new_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        self.mkdir(parse_id(parent_id)?, name, DuplicateMode::KeepBoth)
            .await
    }

    #[instrument(skip(self, declaration), fields(name = %declaration.name, duplicate = ?declaration.duplicate))]
    async fn begin_upload(&self, declaration: &UploadDeclaration) -> Result<BeginUpload> {
        let body = UploadRequestBody::file(
            parse_id(&declaration.parent_id)?,
            &declaration.name,
            declaration.size,
            &declaration.digest,
            declaration.duplicate,
        );
        let request = self.post_json(UPLOAD_REQUEST_PATH, &body)?;

        let data = match self.send::<UploadRequestData>(request).await {
            Err(PanError::ApiError {
                code: CONFLICT_CODE,
                ..
            }) => {
                debug!("Upload of {} conflicts with an existing name", declaration.name);
                return Ok(BeginUpload::Conflict);
            }
            other => other?,
        };

        if data.reuse {
            debug!("Content of {} already stored, reusing", declaration.name);
            let file_id = Some(data.file_id)
                .filter(|id| *id != 0)
                .map(|id| id.to_string());
            return Ok(BeginUpload::Reused { file_id });
        }

        Ok(BeginUpload::Session(UploadCoordinates {
            file_id: data.file_id.to_string(),
            bucket: data.bucket,
            key: data.key,
            upload_id: data.upload_id,
            storage_node: data.storage_node,
        }))
    }

    #[instrument(skip(self, session), fields(upload_id = %session.upload_id))]
    async fn issue_part_url(&self, session: &UploadCoordinates, part_number: u32) -> Result<String> {
        let body = PartBatchBody {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            part_number_start: part_number,
            part_number_end: part_number + 1,
            upload_id: session.upload_id.clone(),
            storage_node: session.storage_node.clone(),
        };
        let request = self.post_json(PART_URLS_PATH, &body)?;
        let mut data = self.send::<PartBatchData>(request).await?;

        data.presigned_urls
            .remove(&part_number.to_string())
            .ok_or_else(|| PanError::MissingField(format!("presignedUrls[{}]", part_number)).into())
    }

    async fn put_part(&self, url: &str, bytes: Bytes) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Put, url)
            .body(bytes)
            .timeout(self.config.request_timeout);
        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(upload_id = %session.upload_id))]
    async fn complete_upload(&self, session: &UploadCoordinates) -> Result<()> {
        let body = Self::session_body(session);
        self.send_ack(self.post_json(LIST_PARTS_PATH, &body)?).await?;
        self.send_ack(self.post_json(COMPLETE_MULTIPART_PATH, &body)?)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn finalize(&self, file_id: &str) -> Result<()> {
        let body = CompleteBody {
            file_id: parse_id(file_id)?,
        };
        self.send_ack(self.post_json(CLOSE_UPLOAD_PATH, &body)?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, id: &str) -> Result<()> {
        let body = TrashBody {
            drive_id: 0,
            file_trash_info_list: vec![TrashEntry {
                file_id: parse_id(id)?,
            }],
            operation: true,
        };
        self.send_ack(self.post_json(TRASH_PATH, &body)?).await?;
        info!("Moved {} to trash", id);
        Ok(())
    }

    async fn ranged_get(&self, url: &str, start: u64, end: u64) -> Result<ByteStream> {
        let request = HttpRequest::new(HttpMethod::Get, url).range(start, end);
        self.http.download_stream(request).await
    }

    async fn get(&self, url: &str) -> Result<ByteStream> {
        self.http
            .download_stream(HttpRequest::new(HttpMethod::Get, url))
            .await
    }

    async fn probe_size(&self, url: &str) -> Result<Option<u64>> {
        let request = HttpRequest::new(HttpMethod::Head, url).timeout(self.config.request_timeout);
        let response = self
            .http
            .execute_with_retry(request, self.config.http_retry.clone())
            .await?;

        if !response.is_success() {
            debug!("HEAD answered {}, size unknown", response.status);
            return Ok(None);
        }
        Ok(response.content_length())
    }

    #[instrument(skip(self, entry), fields(id = %entry.id, folder = entry.is_directory))]
    async fn resolve_download_url(&self, entry: &RemoteEntry) -> Result<String> {
        let file_id = parse_id(&entry.id)?;
        let request = if entry.is_directory {
            let body = BatchDownloadBody {
                file_id_list: vec![DownloadRef { file_id }],
            };
            self.post_json(BATCH_DOWNLOAD_INFO_PATH, &body)?
        } else {
            let body = DownloadInfoBody {
                drive_id: 0,
                etag: entry.digest.clone().unwrap_or_default(),
                file_id,
                s3_key_flag: entry.storage_tag.clone().unwrap_or_default(),
                kind: TYPE_FILE,
                file_name: entry.name.clone(),
                size: entry.size,
            };
            self.post_json(DOWNLOAD_INFO_PATH, &body)?
        };

        let info = self.send::<DownloadInfoData>(request).await?;
        let link = unwrap_download_url(&info.download_url)?;

        // The unwrapped link answers with the signed storage URL.
        let request = HttpRequest::new(HttpMethod::Get, link)
            .header("Accept", "application/json")
            .timeout(self.config.request_timeout);
        let redirect = self.send::<RedirectData>(request).await?;

        debug!("Resolved download link for {}", entry.name);
        Ok(redirect.redirect_url)
    }
}
