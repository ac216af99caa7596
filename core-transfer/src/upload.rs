//! # Chunked Upload Session
//!
//! Drives one file through the multipart upload protocol:
//!
//! ```text
//! Requesting -> Skipped | Reused | Negotiating -> PartsInFlight -> Finalizing -> Done
//!      \______________________\______________\_______________\__________> Failed
//! ```
//!
//! Parts are read sequentially and sent strictly in increasing part-number
//! order. The session never parallelizes internally; concurrency comes from
//! running many sessions side by side in the worker pool.

use crate::context::TransferContext;
use crate::error::{Result, TransferError};
use crate::progress::ProgressAggregate;
use crate::retry::with_retry;
use crate::task::{ConflictPolicy, LocalEntry, PoolTask, TaskOutcome, TransferTask};
use bridge_traits::storage::ReadStream;
use bridge_traits::{BeginUpload, DuplicateMode, UploadCoordinates, UploadDeclaration};
use bytes::Bytes;
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Upload State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Declaring the file to the remote store
    Requesting,
    /// Identical content already present in the target folder
    Skipped,
    /// The store short-circuited the upload with existing content
    Reused,
    /// Upload coordinates received
    Negotiating,
    /// Sending parts
    PartsInFlight,
    /// Assembling parts into the final object
    Finalizing,
    Done,
    Failed,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Requesting => "requesting",
            UploadState::Skipped => "skipped",
            UploadState::Reused => "reused",
            UploadState::Negotiating => "negotiating",
            UploadState::PartsInFlight => "parts_in_flight",
            UploadState::Finalizing => "finalizing",
            UploadState::Done => "done",
            UploadState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Skipped | UploadState::Reused | UploadState::Done | UploadState::Failed
        )
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live multipart session, owned by the worker running the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub coordinates: UploadCoordinates,
    pub part_size: u64,
    /// Part numbers start at 1
    pub next_part_number: u32,
}

impl UploadSession {
    fn new(coordinates: UploadCoordinates, part_size: u64) -> Self {
        Self {
            coordinates,
            part_size,
            next_part_number: 1,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct ChunkedUploadSession {
    ctx: TransferContext,
    task: TransferTask,
    entry: LocalEntry,
    state: UploadState,
    history: Vec<UploadState>,
    progress: Option<Arc<ProgressAggregate>>,
}

impl ChunkedUploadSession {
    pub fn new(ctx: TransferContext, task: TransferTask) -> Self {
        let entry = LocalEntry::new(task.local_path.clone());
        Self {
            ctx,
            task,
            entry,
            state: UploadState::Requesting,
            history: vec![UploadState::Requesting],
            progress: None,
        }
    }

    /// Report sent bytes into a shared aggregate as each part lands.
    pub fn with_progress(mut self, progress: Arc<ProgressAggregate>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[UploadState] {
        &self.history
    }

    /// Upload the file, catching every failure at the task boundary.
    ///
    /// Side effects are limited to creating one remote object, plus deleting
    /// one pre-existing same-named object under [`ConflictPolicy::Overwrite`].
    #[instrument(
        skip(self),
        fields(file = %strip_path(&self.task.local_path.to_string_lossy()))
    )]
    pub async fn upload(&mut self, policy: ConflictPolicy, skip_existing: bool) -> TaskOutcome {
        let label = self.task.label();
        match self.run(policy, skip_existing, &label).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if !self.state.is_terminal() {
                    self.state = UploadState::Failed;
                    self.history.push(UploadState::Failed);
                }
                warn!(error = %e, kind = e.kind(), "Upload failed");
                TaskOutcome::failed(label, e)
            }
        }
    }

    async fn run(
        &mut self,
        policy: ConflictPolicy,
        skip_existing: bool,
        label: &str,
    ) -> Result<TaskOutcome> {
        let size = self.entry.size(self.ctx.fs.as_ref()).await?;
        let hasher = self.ctx.hasher();
        let digest = self.entry.digest(&hasher).await?.to_string();
        let name = self.task.file_name();
        let folder_id = self.task.target_folder_id.clone();

        if skip_existing && self.ctx.dedup().exists(&folder_id, &name, &digest).await {
            self.transition(UploadState::Skipped)?;
            info!("Identical file already present, skipping");
            return Ok(TaskOutcome::skipped(label));
        }

        let declaration = UploadDeclaration {
            parent_id: folder_id,
            name,
            size,
            digest,
            duplicate: DuplicateMode::Reject,
        };

        let coordinates = match self.declare(declaration, policy).await? {
            BeginUpload::Reused { file_id } => {
                self.transition(UploadState::Reused)?;
                info!(file_id = ?file_id, "Store reused existing content");
                return Ok(TaskOutcome::reused(label));
            }
            BeginUpload::Session(coordinates) => coordinates,
            BeginUpload::Conflict => {
                return Err(TransferError::Conflict {
                    name: self.task.file_name(),
                })
            }
        };

        self.transition(UploadState::Negotiating)?;
        validate_coordinates(&coordinates)?;
        let mut session = UploadSession::new(coordinates, self.ctx.settings.part_size);

        self.transition(UploadState::PartsInFlight)?;
        let bytes_sent = self.send_parts(&mut session).await?;

        self.transition(UploadState::Finalizing)?;
        self.finalize(&session, size).await?;

        self.transition(UploadState::Done)?;
        info!(
            bytes = bytes_sent,
            parts = session.next_part_number - 1,
            "Upload complete"
        );
        Ok(TaskOutcome::success(label, bytes_sent))
    }

    /// Declare the file, resolving a name conflict with `policy`.
    async fn declare(
        &self,
        mut declaration: UploadDeclaration,
        policy: ConflictPolicy,
    ) -> Result<BeginUpload> {
        match self.ctx.store.begin_upload(&declaration).await? {
            BeginUpload::Conflict => {}
            other => return Ok(other),
        }

        let mode = policy.duplicate_mode().ok_or_else(|| TransferError::Conflict {
            name: declaration.name.clone(),
        })?;
        info!(policy = %policy, "Remote name conflict, applying policy");

        if policy == ConflictPolicy::Overwrite {
            let existing = self
                .ctx
                .dedup()
                .same_named_file(&declaration.parent_id, &declaration.name)
                .await?;
            if let Some(existing) = existing {
                debug!(id = %existing.id, "Deleting same-named remote file");
                self.ctx.store.delete_object(&existing.id).await?;
            }
        }

        declaration.duplicate = mode;
        match self.ctx.store.begin_upload(&declaration).await? {
            BeginUpload::Conflict => Err(TransferError::Conflict {
                name: declaration.name,
            }),
            other => Ok(other),
        }
    }

    async fn send_parts(&self, session: &mut UploadSession) -> Result<u64> {
        let mut reader = self.ctx.fs.open_read_stream(&self.task.local_path).await?;
        let store = self.ctx.store.as_ref();
        let retry = self.ctx.retry();
        let mut total = 0u64;

        loop {
            let chunk = read_part(&mut reader, session.part_size).await?;
            if chunk.is_empty() {
                break;
            }

            let part_number = session.next_part_number;
            let coordinates = &session.coordinates;
            let url = with_retry(retry, "issue_part_url", || async move {
                store
                    .issue_part_url(coordinates, part_number)
                    .await
                    .map_err(TransferError::from)
            })
            .await?;

            let url = url.as_str();
            let part = &chunk;
            with_retry(retry, "put_part", || async move {
                store
                    .put_part(url, part.clone())
                    .await
                    .map_err(TransferError::from)
            })
            .await?;

            let sent = chunk.len() as u64;
            total += sent;
            if let Some(progress) = &self.progress {
                progress.add_bytes(sent);
            }
            debug!(part_number, bytes = sent, "Part uploaded");
            session.next_part_number += 1;
        }

        Ok(total)
    }

    async fn finalize(&self, session: &UploadSession, size: u64) -> Result<()> {
        self.ctx.store.complete_upload(&session.coordinates).await?;

        if size > self.ctx.settings.large_file_threshold {
            let delay = self.ctx.settings.finalize_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Large file, waiting before finalize");
            tokio::time::sleep(delay).await;
        }

        self.ctx.store.finalize(&session.coordinates.file_id).await?;
        Ok(())
    }

    fn transition(&mut self, to: UploadState) -> Result<()> {
        self.validate_transition(to)?;
        debug!(from = %self.state, to = %to, "Upload state change");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    fn validate_transition(&self, to: UploadState) -> Result<()> {
        let valid = match (self.state, to) {
            // From Requesting
            (UploadState::Requesting, UploadState::Skipped) => true,
            (UploadState::Requesting, UploadState::Reused) => true,
            (UploadState::Requesting, UploadState::Negotiating) => true,

            (UploadState::Negotiating, UploadState::PartsInFlight) => true,
            (UploadState::PartsInFlight, UploadState::Finalizing) => true,
            (UploadState::Finalizing, UploadState::Done) => true,

            // Any live state may fail
            (from, UploadState::Failed) => !from.is_terminal(),

            _ => false,
        };

        if !valid {
            return Err(TransferError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(())
    }
}

fn validate_coordinates(coordinates: &UploadCoordinates) -> Result<()> {
    if coordinates.file_id.is_empty() || coordinates.upload_id.is_empty() {
        return Err(TransferError::RemoteRejected {
            code: 0,
            message: "Upload session is missing file or upload id".to_string(),
        });
    }
    Ok(())
}

/// Read up to `part_size` bytes, returning fewer only at end of file.
async fn read_part(reader: &mut ReadStream, part_size: u64) -> Result<Bytes> {
    let mut buffer = Vec::with_capacity(part_size.min(8 * 1024 * 1024) as usize);
    reader.take(part_size).read_to_end(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::ContentHasher;
    use crate::task::TaskStatus;
    use crate::test_support::{coordinates, remote_file, MockStore};
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::BridgeError;
    use core_runtime::config::TransferSettings;
    use mockall::predicate::eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ABC_DIGEST: &str = "900150983cd24fb0d6963f7d28e17f72";

    fn context(store: MockStore, part_size: u64) -> TransferContext {
        TransferContext::new(
            Arc::new(store),
            Arc::new(TokioFileSystem::new()),
            TransferSettings::default()
                .without_delays()
                .with_part_size(part_size),
        )
    }

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> TransferTask {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        TransferTask::new(path, "folder-1")
    }

    fn expect_happy_finish(store: &mut MockStore) {
        store.expect_complete_upload().times(1).returning(|_| Ok(()));
        store
            .expect_finalize()
            .with(eq("file-1"))
            .times(1)
            .returning(|_| Ok(()));
    }

    #[tokio::test]
    async fn test_parts_sent_in_order() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.bin", b"0123456789");

        let mut store = MockStore::new();
        store
            .expect_list_directory()
            .returning(|_| Ok(Vec::new()));
        store
            .expect_begin_upload()
            .withf(|decl| decl.digest == ContentHasher::digest_bytes(b"0123456789"))
            .times(1)
            .returning(|_| Ok(BeginUpload::Session(coordinates("file-1"))));
        store
            .expect_issue_part_url()
            .times(3)
            .returning(|_, n| Ok(format!("https://part/{}", n)));

        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        store.expect_put_part().times(3).returning(move |url, bytes| {
            sink.lock().unwrap().push((url.to_string(), bytes.to_vec()));
            Ok(())
        });
        expect_happy_finish(&mut store);

        let progress = Arc::new(ProgressAggregate::new());
        let mut session =
            ChunkedUploadSession::new(context(store, 4), task).with_progress(progress.clone());
        let outcome = session.upload(ConflictPolicy::Fail, true).await;

        assert_eq!(outcome.status, TaskStatus::Success);
        assert_eq!(outcome.bytes_sent, 10);
        assert_eq!(progress.snapshot().bytes_transferred, 10);
        assert_eq!(session.state(), UploadState::Done);
        assert_eq!(
            session.history(),
            &[
                UploadState::Requesting,
                UploadState::Negotiating,
                UploadState::PartsInFlight,
                UploadState::Finalizing,
                UploadState::Done,
            ]
        );

        let sent = sent.lock().unwrap();
        let urls: Vec<_> = sent.iter().map(|(url, _)| url.as_str()).collect();
        assert_eq!(urls, vec!["https://part/1", "https://part/2", "https://part/3"]);
        let sizes: Vec<_> = sent.iter().map(|(_, bytes)| bytes.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_identical_remote_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.txt", b"abc");

        let mut store = MockStore::new();
        store
            .expect_list_directory()
            .with(eq("folder-1"))
            .returning(|_| Ok(vec![remote_file("7", "a.txt", ABC_DIGEST)]));
        store.expect_begin_upload().never();

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Fail, true).await;

        assert_eq!(outcome.status, TaskStatus::Skipped);
        assert_eq!(session.state(), UploadState::Skipped);
    }

    #[tokio::test]
    async fn test_skip_existing_disabled_still_declares() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.txt", b"abc");

        let mut store = MockStore::new();
        store.expect_list_directory().never();
        store
            .expect_begin_upload()
            .times(1)
            .returning(|_| Ok(BeginUpload::Reused { file_id: None }));

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Fail, false).await;

        assert_eq!(outcome.status, TaskStatus::Success);
        assert!(outcome.reused);
        assert_eq!(outcome.bytes_sent, 0);
        assert_eq!(session.state(), UploadState::Reused);
    }

    #[tokio::test]
    async fn test_conflict_with_fail_policy() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.txt", b"abc");

        let mut store = MockStore::new();
        store
            .expect_begin_upload()
            .times(1)
            .returning(|_| Ok(BeginUpload::Conflict));
        store.expect_delete_object().never();

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Fail, false).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(
            outcome.error,
            Some(TransferError::Conflict {
                name: "a.txt".into()
            })
        );
        assert_eq!(session.state(), UploadState::Failed);
    }

    #[tokio::test]
    async fn test_conflict_with_keep_both_redeclares() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.txt", b"abc");

        let mut store = MockStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_begin_upload()
            .withf(|decl| decl.duplicate == DuplicateMode::Reject)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(BeginUpload::Conflict));
        store
            .expect_begin_upload()
            .withf(|decl| decl.duplicate == DuplicateMode::KeepBoth)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(BeginUpload::Session(coordinates("file-1"))));
        store.expect_delete_object().never();
        store
            .expect_issue_part_url()
            .times(1)
            .returning(|_, _| Ok("https://part/1".into()));
        store.expect_put_part().times(1).returning(|_, _| Ok(()));
        expect_happy_finish(&mut store);

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::KeepBoth, false).await;

        assert_eq!(outcome.status, TaskStatus::Success);
        assert_eq!(outcome.bytes_sent, 3);
    }

    #[tokio::test]
    async fn test_conflict_with_overwrite_deletes_existing() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.txt", b"abc");

        let mut store = MockStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_begin_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(BeginUpload::Conflict));
        store
            .expect_list_directory()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![remote_file("old-9", "a.txt", "ffff")]));
        store
            .expect_delete_object()
            .with(eq("old-9"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_begin_upload()
            .withf(|decl| decl.duplicate == DuplicateMode::Overwrite)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(BeginUpload::Session(coordinates("file-1"))));
        store
            .expect_issue_part_url()
            .returning(|_, _| Ok("https://part/1".into()));
        store.expect_put_part().returning(|_, _| Ok(()));
        expect_happy_finish(&mut store);

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Overwrite, false).await;

        assert_eq!(outcome.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_part_failure_aborts_remaining_parts() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.bin", b"0123456789");

        let mut store = MockStore::new();
        store
            .expect_begin_upload()
            .returning(|_| Ok(BeginUpload::Session(coordinates("file-1"))));
        store
            .expect_issue_part_url()
            .times(1)
            .returning(|_, n| Ok(format!("https://part/{}", n)));
        store
            .expect_put_part()
            .times(1)
            .returning(|_, _| Err(BridgeError::OperationFailed("connection reset".into())));
        store.expect_complete_upload().never();
        store.expect_finalize().never();

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Fail, false).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(matches!(outcome.error, Some(TransferError::NetworkFailure(_))));
        assert_eq!(
            session.history().last().copied(),
            Some(UploadState::Failed)
        );
    }

    #[tokio::test]
    async fn test_rejection_is_surfaced_verbatim() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "a.txt", b"abc");

        let mut store = MockStore::new();
        store
            .expect_begin_upload()
            .returning(|_| Err(BridgeError::rejected(401, "token expired")));

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Fail, false).await;

        assert_eq!(
            outcome.error,
            Some(TransferError::RemoteRejected {
                code: 401,
                message: "token expired".into()
            })
        );
    }

    #[tokio::test]
    async fn test_empty_file_completes_without_parts() {
        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "empty.txt", b"");

        let mut store = MockStore::new();
        store
            .expect_begin_upload()
            .returning(|_| Ok(BeginUpload::Session(coordinates("file-1"))));
        store.expect_issue_part_url().never();
        store.expect_put_part().never();
        expect_happy_finish(&mut store);

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Fail, false).await;

        assert_eq!(outcome.status, TaskStatus::Success);
        assert_eq!(outcome.bytes_sent, 0);
    }

    /// Virtual time between `complete_upload` and `finalize` for a file of
    /// `len` bytes, with an 8-byte large-file threshold and a 5 s delay.
    async fn finalize_gap(len: usize) -> std::time::Duration {
        use tokio::time::Instant;

        let dir = TempDir::new().unwrap();
        let task = write_file(&dir, "f.bin", &vec![7u8; len]);

        let completed = Arc::new(Mutex::new(None::<Instant>));
        let finalized = Arc::new(Mutex::new(None::<Instant>));
        let (c, f) = (Arc::clone(&completed), Arc::clone(&finalized));

        let mut store = MockStore::new();
        store
            .expect_begin_upload()
            .returning(|_| Ok(BeginUpload::Session(coordinates("file-1"))));
        store
            .expect_issue_part_url()
            .returning(|_, n| Ok(format!("https://part/{}", n)));
        store.expect_put_part().returning(|_, _| Ok(()));
        store.expect_complete_upload().times(1).returning(move |_| {
            *c.lock().unwrap() = Some(Instant::now());
            Ok(())
        });
        store.expect_finalize().times(1).returning(move |_| {
            *f.lock().unwrap() = Some(Instant::now());
            Ok(())
        });

        let settings = TransferSettings {
            large_file_threshold: 8,
            finalize_delay_ms: 5_000,
            ..TransferSettings::default().without_delays().with_part_size(4)
        };
        let ctx = TransferContext::new(Arc::new(store), Arc::new(TokioFileSystem::new()), settings);
        let outcome = ChunkedUploadSession::new(ctx, task)
            .upload(ConflictPolicy::Fail, false)
            .await;
        assert_eq!(outcome.status, TaskStatus::Success);

        let completed = completed.lock().unwrap().unwrap();
        let finalized = finalized.lock().unwrap().unwrap();
        finalized - completed
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_file_waits_before_finalize() {
        assert!(finalize_gap(9).await >= std::time::Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_at_threshold_finalizes_immediately() {
        assert_eq!(finalize_gap(8).await, std::time::Duration::ZERO);
        assert_eq!(finalize_gap(3).await, std::time::Duration::ZERO);
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_with_not_found() {
        let dir = TempDir::new().unwrap();
        let task = TransferTask::new(dir.path().join("gone.txt"), "folder-1");

        let mut store = MockStore::new();
        store.expect_begin_upload().never();

        let mut session = ChunkedUploadSession::new(context(store, 4), task);
        let outcome = session.upload(ConflictPolicy::Fail, true).await;

        assert!(matches!(outcome.error, Some(TransferError::NotFound(_))));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        assert!(UploadState::Done.is_terminal());
        assert!(UploadState::Reused.is_terminal());
        assert!(!UploadState::PartsInFlight.is_terminal());
    }
}
