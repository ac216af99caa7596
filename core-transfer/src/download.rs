//! # Chunked Download Session
//!
//! Fetches one remote resource either as a single stream or as parallel byte
//! ranges. Ranged downloads land in `<dest>.part<N>` temporaries which are
//! concatenated strictly in range order once every range has finished.

use crate::context::TransferContext;
use crate::error::{Result, TransferError};
use crate::pool::ConcurrencyController;
use crate::progress::ProgressAggregate;
use crate::retry::with_retry;
use crate::task::{PoolTask, TaskOutcome};
use core_runtime::events::TransferEvent;
use core_runtime::logging::{redact_url, strip_path};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Read buffer for streamed transfers (8 KiB).
pub const STREAM_BUFFER_SIZE: usize = 8 * 1024;

/// Single-stream progress is published every time this many bytes land.
const PROGRESS_INTERVAL: u64 = 1024 * 1024;

// ============================================================================
// Range Planning
// ============================================================================

/// Inclusive byte range `[start, end]` of one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Partition `[0, size)` into at most `workers` contiguous ranges.
///
/// Every range but the last has `size / n` bytes; the last absorbs the
/// remainder. Never produces an empty range, so tiny resources get fewer
/// ranges than workers, and a zero-byte resource gets none.
pub fn plan_ranges(size: u64, workers: usize) -> Vec<ByteRange> {
    if size == 0 {
        return Vec::new();
    }

    let count = (workers.max(1) as u64).min(size);
    let chunk = size / count;

    (0..count)
        .map(|i| {
            let start = i * chunk;
            let end = if i == count - 1 {
                size - 1
            } else {
                start + chunk - 1
            };
            ByteRange {
                index: i as usize,
                start,
                end,
            }
        })
        .collect()
}

/// Temporary file holding range `index` of `dest`.
pub fn part_path(dest: &Path, index: usize) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(format!(".part{}", index));
    PathBuf::from(name)
}

/// Planned ranged download of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub total_size: u64,
    pub ranges: Vec<ByteRange>,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, total_size: u64, workers: usize) -> Self {
        Self {
            url: url.into(),
            total_size,
            ranges: plan_ranges(total_size, workers),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub dest: PathBuf,
    /// Falls back to the configured download worker count
    pub worker_count: Option<usize>,
    /// Skip range planning even when the size is known
    pub force_single: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            worker_count: None,
            force_single: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    pub fn single_stream(mut self) -> Self {
        self.force_single = true;
        self
    }
}

/// One range fetch, runnable by the worker pool.
#[derive(Debug, Clone)]
struct RangeTask {
    url: String,
    range: ByteRange,
    part: PathBuf,
}

impl PoolTask for RangeTask {
    fn label(&self) -> String {
        format!(
            "range {} [{}-{}]",
            self.range.index, self.range.start, self.range.end
        )
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct ChunkedDownloadSession {
    ctx: TransferContext,
    cancel: CancellationToken,
}

impl ChunkedDownloadSession {
    pub fn new(ctx: TransferContext, cancel: CancellationToken) -> Self {
        Self { ctx, cancel }
    }

    /// Download `url` into `dest` with up to `worker_count` parallel ranges.
    /// Returns the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path, worker_count: usize) -> Result<u64> {
        self.run(&DownloadRequest::new(url, dest).with_workers(worker_count))
            .await
    }

    /// Any range failure fails the whole download and removes every
    /// temporary part; there is no partial-success mode.
    #[instrument(
        skip(self, request),
        fields(url = %redact_url(&request.url), dest = %strip_path(&request.dest.to_string_lossy()))
    )]
    pub async fn run(&self, request: &DownloadRequest) -> Result<u64> {
        let total_size = self.probe(&request.url).await;
        let workers = request
            .worker_count
            .unwrap_or(self.ctx.settings.download_workers)
            .max(1);

        let ranged = match total_size {
            Some(size) if !request.force_single => Some(DownloadJob::new(&request.url, size, workers)),
            _ => None,
        };

        self.ctx.events.emit_transfer(TransferEvent::DownloadStarted {
            url: request.url.clone(),
            total_size,
            ranges: ranged.as_ref().map_or(0, |job| job.ranges.len() as u64),
        });

        let result = match ranged {
            Some(job) => {
                info!(size = job.total_size, ranges = job.ranges.len(), "Starting ranged download");
                self.ranged(&job, &request.dest, workers).await
            }
            None => {
                info!(size = ?total_size, "Starting single-stream download");
                self.single_stream(&request.url, &request.dest, total_size)
                    .await
            }
        };

        match &result {
            Ok(bytes_written) => {
                info!(bytes = *bytes_written, "Download complete");
                self.ctx.events.emit_transfer(TransferEvent::DownloadCompleted {
                    url: request.url.clone(),
                    bytes_written: *bytes_written,
                });
            }
            Err(e) => {
                warn!(error = %e, "Download failed");
                self.ctx.events.emit_transfer(TransferEvent::DownloadFailed {
                    url: request.url.clone(),
                    message: e.to_string(),
                });
            }
        }

        result
    }

    /// A failed probe is treated like an unknown size.
    async fn probe(&self, url: &str) -> Option<u64> {
        let store = self.ctx.store.as_ref();
        let probed = with_retry(self.ctx.retry(), "probe_size", || async move {
            store.probe_size(url).await.map_err(TransferError::from)
        })
        .await;

        match probed {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "Size probe failed, falling back to single stream");
                None
            }
        }
    }

    async fn single_stream(&self, url: &str, dest: &Path, total_size: Option<u64>) -> Result<u64> {
        let store = self.ctx.store.as_ref();
        let mut stream = with_retry(self.ctx.retry(), "get", || async move {
            store.get(url).await.map_err(TransferError::from)
        })
        .await?;

        let mut writer = self.ctx.fs.open_write_stream(dest).await?;
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
        let mut written = 0u64;
        let mut next_report = PROGRESS_INTERVAL;

        let copied: Result<()> = async {
            loop {
                let read = stream
                    .read(&mut buffer)
                    .await
                    .map_err(|e| TransferError::NetworkFailure(e.to_string()))?;
                if read == 0 {
                    break;
                }
                writer.write_all(&buffer[..read]).await?;
                written += read as u64;

                if written >= next_report {
                    next_report = written + PROGRESS_INTERVAL;
                    self.ctx.events.emit_transfer(TransferEvent::DownloadProgress {
                        url: url.to_string(),
                        bytes_written: written,
                        total_size,
                    });
                }
            }
            writer.shutdown().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            remove_quietly(&self.ctx, dest).await;
            return Err(e);
        }

        self.ctx.events.emit_transfer(TransferEvent::DownloadProgress {
            url: url.to_string(),
            bytes_written: written,
            total_size,
        });
        Ok(written)
    }

    async fn ranged(&self, job: &DownloadJob, dest: &Path, workers: usize) -> Result<u64> {
        let tasks: Vec<RangeTask> = job
            .ranges
            .iter()
            .map(|range| RangeTask {
                url: job.url.clone(),
                range: *range,
                part: part_path(dest, range.index),
            })
            .collect();

        let progress = Arc::new(ProgressAggregate::new());
        let ctx = self.ctx.clone();
        let bytes = Arc::clone(&progress);

        let report = ConcurrencyController::new(workers)
            .with_events(self.ctx.events.clone())
            .run_all(tasks, Arc::clone(&progress), &self.cancel, move |task| {
                let ctx = ctx.clone();
                let bytes = Arc::clone(&bytes);
                async move {
                    let label = task.label();
                    match fetch_range(&ctx, &task).await {
                        Ok(written) => {
                            bytes.add_bytes(written);
                            TaskOutcome::success(label, written)
                        }
                        Err(e) => TaskOutcome::failed(label, e),
                    }
                }
            })
            .await;

        if !report.is_clean() {
            self.remove_parts(job, dest).await;
            if report.failed == 0 {
                return Err(TransferError::Cancelled);
            }
            let reasons: Vec<String> = report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.label, f.reason))
                .collect();
            return Err(TransferError::NetworkFailure(format!(
                "{} of {} ranges failed ({})",
                report.failed,
                job.ranges.len(),
                reasons.join("; ")
            )));
        }

        let assembled = self.assemble(job, dest).await;
        self.remove_parts(job, dest).await;
        let written = assembled?;

        if written != job.total_size {
            remove_quietly(&self.ctx, dest).await;
            return Err(TransferError::IoFailure(format!(
                "assembled {} bytes, expected {}",
                written, job.total_size
            )));
        }
        Ok(written)
    }

    /// Concatenate every part into `dest` in index order.
    async fn assemble(&self, job: &DownloadJob, dest: &Path) -> Result<u64> {
        let mut writer = self.ctx.fs.open_write_stream(dest).await?;
        let mut written = 0u64;

        for range in &job.ranges {
            let mut reader = self
                .ctx
                .fs
                .open_read_stream(&part_path(dest, range.index))
                .await?;
            written += tokio::io::copy(&mut reader, &mut writer).await?;
        }

        writer.shutdown().await?;
        debug!(bytes = written, parts = job.ranges.len(), "Parts assembled");
        Ok(written)
    }

    async fn remove_parts(&self, job: &DownloadJob, dest: &Path) {
        for range in &job.ranges {
            remove_quietly(&self.ctx, &part_path(dest, range.index)).await;
        }
    }
}

/// Fetch one range into its part file, re-fetching the whole range on a
/// retryable failure. Returns the verified byte count.
async fn fetch_range(ctx: &TransferContext, task: &RangeTask) -> Result<u64> {
    with_retry(ctx.retry(), "ranged_get", || async move {
        let mut stream = ctx
            .store
            .ranged_get(&task.url, task.range.start, task.range.end)
            .await?;
        let mut writer = ctx.fs.open_write_stream(&task.part).await?;
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            let read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| TransferError::NetworkFailure(e.to_string()))?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            written += read as u64;
        }
        writer.shutdown().await?;

        if written != task.range.len() {
            return Err(TransferError::NetworkFailure(format!(
                "range {} returned {} bytes, expected {}",
                task.range.index,
                written,
                task.range.len()
            )));
        }
        Ok(written)
    })
    .await
}

async fn remove_quietly(ctx: &TransferContext, path: &Path) {
    match ctx.fs.delete_file(path).await {
        Ok(()) => {}
        Err(bridge_traits::BridgeError::NotFound(_)) => {}
        Err(e) => warn!(error = %e, path = %strip_path(&path.to_string_lossy()), "Failed to remove temporary file"),
    }
}
