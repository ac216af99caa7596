//! # Transfer Engine
//!
//! Entry point for hosts: built once from a [`CoreConfig`], then used for any
//! number of mirror, upload and download operations sharing one event bus and
//! one cancellation root.

use crate::context::TransferContext;
use crate::download::{ChunkedDownloadSession, DownloadRequest};
use crate::error::{Result, TransferError};
use crate::mirror::{DirectoryMirror, MirrorRequest};
use crate::report::TransferReport;
use crate::retry::with_retry;
use crate::task::{ConflictPolicy, TaskOutcome, TransferTask};
use crate::upload::ChunkedUploadSession;
use bridge_traits::RemoteEntry;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventStream;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub struct TransferEngine {
    ctx: TransferContext,
    cancel: CancellationToken,
}

impl TransferEngine {
    /// # Errors
    ///
    /// `Config` if the transfer settings are invalid.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.settings.validate()?;
        info!(
            mirror_workers = config.settings.mirror_workers,
            download_workers = config.settings.download_workers,
            "Transfer engine ready"
        );
        Ok(Self {
            ctx: TransferContext::from_config(&config),
            cancel: CancellationToken::new(),
        })
    }

    pub fn context(&self) -> &TransferContext {
        &self.ctx
    }

    /// Mirror a local tree (or a single file) under a remote folder.
    pub async fn mirror_directory(&self, request: &MirrorRequest) -> Result<TransferReport> {
        DirectoryMirror::new(self.ctx.clone(), self.cancel.child_token())
            .mirror(request)
            .await
    }

    /// Upload one file into `folder_id`.
    #[instrument(skip(self, local_path))]
    pub async fn upload_file(
        &self,
        local_path: impl Into<PathBuf>,
        folder_id: &str,
        policy: ConflictPolicy,
        skip_existing: bool,
    ) -> TaskOutcome {
        let task = TransferTask::new(local_path, folder_id);
        if self.cancel.is_cancelled() {
            return TaskOutcome::failed(task.local_path.display().to_string(), TransferError::Cancelled);
        }

        let mut session = ChunkedUploadSession::new(self.ctx.clone(), task);
        session.upload(policy, skip_existing).await
    }

    /// Download one resource; returns bytes written.
    pub async fn download(&self, request: &DownloadRequest) -> Result<u64> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        ChunkedDownloadSession::new(self.ctx.clone(), self.cancel.child_token())
            .run(request)
            .await
    }

    /// Download a listed remote object to `dest`. Folders arrive as the
    /// store's archive and are fetched as a single stream.
    #[instrument(skip(self, entry, dest), fields(id = %entry.id, name = %entry.name))]
    pub async fn download_entry(
        &self,
        entry: &RemoteEntry,
        dest: impl Into<PathBuf>,
    ) -> Result<u64> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let store = self.ctx.store.as_ref();
        let url = with_retry(self.ctx.retry(), "resolve_download_url", || async move {
            store
                .resolve_download_url(entry)
                .await
                .map_err(TransferError::from)
        })
        .await?;

        let mut request = DownloadRequest::new(url, dest);
        if entry.is_directory {
            request = request.single_stream();
        }
        self.download(&request).await
    }

    /// Stop starting new work. Running tasks finish on their own. The engine
    /// stays cancelled; build a new one to transfer again.
    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled together with the engine, e.g. for a signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.ctx.events.subscribe())
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("ctx", &self.ctx)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
