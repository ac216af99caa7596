//! # Directory Mirror
//!
//! Maps a local directory tree onto remote folders and uploads every file
//! through the worker pool.
//!
//! The walk is breadth-first. A subdirectory's remote folder is resolved
//! before anything beneath it is visited, so no folder is ever created ahead
//! of its parent's id. Symlinked directories are not descended into; a
//! symlinked file is uploaded with its target's content.

use crate::context::TransferContext;
use crate::error::{Result, TransferError};
use crate::pool::ConcurrencyController;
use crate::progress::ProgressAggregate;
use crate::report::TransferReport;
use crate::retry::with_retry;
use crate::task::{ConflictPolicy, TransferTask};
use crate::upload::ChunkedUploadSession;
use core_runtime::events::TransferEvent;
use core_runtime::logging::strip_path;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRequest {
    pub local_root: PathBuf,
    pub target_parent_id: String,
    /// Remote name of the root folder; defaults to the local basename
    pub dest_name: Option<String>,
    pub conflict_policy: ConflictPolicy,
    /// Skip files whose name and digest already exist remotely
    pub skip_existing: bool,
    /// File-name suffixes to include; `None` includes everything
    pub file_types: Option<Vec<String>>,
    /// Reuse a same-named root folder; when false a new root folder is
    /// always created and the store disambiguates its name
    pub reuse_existing_root: bool,
    /// Falls back to the configured mirror worker count
    pub worker_limit: Option<usize>,
}

impl MirrorRequest {
    pub fn new(local_root: impl Into<PathBuf>, target_parent_id: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            target_parent_id: target_parent_id.into(),
            dest_name: None,
            conflict_policy: ConflictPolicy::default(),
            skip_existing: true,
            file_types: None,
            reuse_existing_root: true,
            worker_limit: None,
        }
    }

    pub fn with_dest_name(mut self, name: impl Into<String>) -> Self {
        self.dest_name = Some(name.into());
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn with_file_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Create a new root folder even if one with the same name exists.
    pub fn remake_root(mut self) -> Self {
        self.reuse_existing_root = false;
        self
    }

    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = Some(limit);
        self
    }

    fn root_name(&self) -> String {
        self.dest_name.clone().unwrap_or_else(|| {
            self.local_root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.local_root.display().to_string())
        })
    }

    /// True when `name` ends with one of the configured suffixes.
    /// Matching is case-sensitive.
    pub fn accepts(&self, name: &str) -> bool {
        match &self.file_types {
            None => true,
            Some(types) => types.iter().any(|suffix| name.ends_with(suffix.as_str())),
        }
    }
}

// ============================================================================
// Folder Cache
// ============================================================================

/// `local directory -> remote folder id` for one mirror run.
///
/// Lookups and creations go through one lock, so two workers can never create
/// two remote folders for the same local directory.
#[derive(Debug, Default)]
pub struct FolderCache {
    folders: Mutex<HashMap<PathBuf, String>>,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &Path) -> Option<String> {
        self.folders.lock().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.folders.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.folders.lock().await.is_empty()
    }

    /// Cached id for `path`, or the id returned by `create`.
    ///
    /// The flag is true only when `create` ran.
    pub async fn resolve_or_create<F, Fut>(&self, path: &Path, create: F) -> Result<(String, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let mut folders = self.folders.lock().await;
        if let Some(id) = folders.get(path) {
            return Ok((id.clone(), false));
        }

        let id = create().await?;
        folders.insert(path.to_path_buf(), id.clone());
        Ok((id, true))
    }
}

// ============================================================================
// Mirror
// ============================================================================

/// What the walk found before handing off to the pool.
#[derive(Debug, Default)]
struct Walk {
    tasks: Vec<TransferTask>,
    /// `(path, reason)` for directories that could not be listed or mapped
    failures: Vec<(String, String)>,
    /// Directories never visited because the run was cancelled
    unvisited: usize,
}

pub struct DirectoryMirror {
    ctx: TransferContext,
    cancel: CancellationToken,
    folders: FolderCache,
}

impl DirectoryMirror {
    pub fn new(ctx: TransferContext, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            cancel,
            folders: FolderCache::new(),
        }
    }

    /// Folders resolved so far in this run.
    pub fn folders(&self) -> &FolderCache {
        &self.folders
    }

    /// Mirror `request.local_root` under `request.target_parent_id`.
    ///
    /// Per-file and per-directory failures are reported, not raised. Only a
    /// missing root or a root folder that cannot be created is an error.
    #[instrument(
        skip(self, request),
        fields(root = %strip_path(&request.local_root.to_string_lossy()), parent = %request.target_parent_id)
    )]
    pub async fn mirror(&self, request: &MirrorRequest) -> Result<TransferReport> {
        // Phase 1: validate the root
        let root = self
            .ctx
            .fs
            .metadata(&request.local_root)
            .await
            .map_err(|_| {
                TransferError::NotFound(request.local_root.display().to_string())
            })?;

        let mut walk = Walk::default();
        if root.is_directory {
            // Phase 2: root folder
            let root_id = self.create_root(request).await?;
            self.ctx.events.emit_transfer(TransferEvent::MirrorStarted {
                local_root: request.local_root.display().to_string(),
                remote_root_id: root_id.clone(),
            });

            // Phase 3: walk
            self.walk(request, root_id, &mut walk).await;
        } else {
            info!("Root is a single file, uploading into the target folder");
            self.ctx.events.emit_transfer(TransferEvent::MirrorStarted {
                local_root: request.local_root.display().to_string(),
                remote_root_id: request.target_parent_id.clone(),
            });
            walk.tasks.push(TransferTask::new(
                request.local_root.clone(),
                request.target_parent_id.clone(),
            ));
        }

        info!(
            files = walk.tasks.len(),
            folders = self.folders.len().await,
            "Walk complete, starting uploads"
        );

        // Phase 4: upload
        let mut report = self.upload_all(request, walk.tasks).await;
        for (label, reason) in walk.failures {
            report.push_failure(label, reason);
        }
        report.cancelled += walk.unvisited;

        self.ctx.events.emit_transfer(TransferEvent::MirrorCompleted {
            total: report.total as u64,
            succeeded: report.succeeded as u64,
            skipped: report.skipped as u64,
            failed: report.failed as u64,
            cancelled: report.cancelled as u64,
            bytes_transferred: report.bytes_transferred,
        });

        if report.is_clean() {
            info!(summary = %report.summary(), "Mirror complete");
        } else {
            warn!(summary = %report.summary(), "Mirror finished with failures");
        }
        Ok(report)
    }

    async fn create_root(&self, request: &MirrorRequest) -> Result<String> {
        let name = request.root_name();
        let store = self.ctx.store.as_ref();
        let parent = request.target_parent_id.as_str();
        let reuse = request.reuse_existing_root;

        let (root_id, _) = self
            .folders
            .resolve_or_create(&request.local_root, || async {
                let name = name.as_str();
                if reuse {
                    with_retry(self.ctx.retry(), "create_folder", || async move {
                        store
                            .create_folder(parent, name, false)
                            .await
                            .map_err(TransferError::from)
                    })
                    .await
                } else {
                    // Not idempotent; never retried.
                    store
                        .create_new_folder(parent, name)
                        .await
                        .map_err(TransferError::from)
                }
            })
            .await?;

        debug!(root_id = %root_id, name = %name, "Root folder resolved");
        self.ctx.events.emit_transfer(TransferEvent::FolderCreated {
            local_path: request.local_root.display().to_string(),
            folder_id: root_id.clone(),
        });
        Ok(root_id)
    }

    /// Breadth-first walk collecting upload tasks. Failures to list or map a
    /// directory are recorded and its contents are left out.
    async fn walk(&self, request: &MirrorRequest, root_id: String, walk: &mut Walk) {
        let tasks = &mut walk.tasks;
        let failures = &mut walk.failures;
        let mut queue = VecDeque::from([(request.local_root.clone(), root_id)]);

        while let Some((dir, folder_id)) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                walk.unvisited = queue.len() + 1;
                warn!(unvisited = walk.unvisited, "Mirror cancelled during walk");
                break;
            }

            let children = match self.ctx.fs.list_directory(&dir).await {
                Ok(children) => children,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Cannot list directory");
                    failures.push((dir.display().to_string(), e.to_string()));
                    continue;
                }
            };

            for child in children {
                let metadata = match self.ctx.fs.metadata(&child).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        failures.push((child.display().to_string(), e.to_string()));
                        continue;
                    }
                };
                let name = child
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();

                if metadata.is_directory {
                    if metadata.is_symlink {
                        debug!(dir = %name, "Not following directory symlink");
                        continue;
                    }
                    if self.is_skipped(&name) {
                        debug!(dir = %name, "Skipping excluded directory");
                        continue;
                    }
                    match self.map_directory(&child, &folder_id, &name).await {
                        Ok(child_id) => queue.push_back((child, child_id)),
                        Err(e) => {
                            warn!(dir = %child.display(), error = %e, "Cannot create remote folder");
                            failures.push((child.display().to_string(), e.to_string()));
                        }
                    }
                } else if request.accepts(&name) {
                    tasks.push(TransferTask::new(child, folder_id.clone()));
                }
            }
        }
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.ctx
            .settings
            .skip_dirs
            .iter()
            .any(|pattern| !pattern.is_empty() && name.contains(pattern.as_str()))
    }

    async fn map_directory(&self, dir: &Path, parent_id: &str, name: &str) -> Result<String> {
        let store = self.ctx.store.as_ref();
        let (folder_id, created) = self
            .folders
            .resolve_or_create(dir, || async {
                with_retry(self.ctx.retry(), "create_folder", || async move {
                    store
                        .create_folder(parent_id, name, false)
                        .await
                        .map_err(TransferError::from)
                })
                .await
            })
            .await?;

        if created {
            self.ctx.events.emit_transfer(TransferEvent::FolderCreated {
                local_path: dir.display().to_string(),
                folder_id: folder_id.clone(),
            });
            let delay = self.ctx.settings.folder_create_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(folder_id)
    }

    async fn upload_all(&self, request: &MirrorRequest, tasks: Vec<TransferTask>) -> TransferReport {
        let limit = request
            .worker_limit
            .unwrap_or(self.ctx.settings.mirror_workers);
        let progress = Arc::new(ProgressAggregate::new());
        let ctx = self.ctx.clone();
        let sent = Arc::clone(&progress);
        let policy = request.conflict_policy;
        let skip_existing = request.skip_existing;

        ConcurrencyController::new(limit)
            .with_events(self.ctx.events.clone())
            .run_all(tasks, progress, &self.cancel, move |task: TransferTask| {
                let ctx = ctx.clone();
                let sent = Arc::clone(&sent);
                async move {
                    let mut session = ChunkedUploadSession::new(ctx, task).with_progress(sent);
                    session.upload(policy, skip_existing).await
                }
            })
            .await
    }
}
