//! # Transfer Engine Core
//!
//! Concurrent transfer logic between a local filesystem and a remote object
//! store.
//!
//! ## Overview
//!
//! - Mapping a local directory tree onto remote folders
//! - Content-addressed dedup before each upload
//! - Chunked multipart uploads and parallel ranged downloads
//! - Bounded worker pools with per-task failure isolation
//!
//! ## Components
//!
//! - **Content Hasher** (`hasher`): streaming MD5 digests in fixed-size blocks
//! - **Dedup Checker** (`dedup`): name + digest lookup in a remote folder
//! - **Chunked Upload Session** (`upload`): per-file multipart state machine
//! - **Chunked Download Session** (`download`): range planning and reassembly
//! - **Directory Mirror** (`mirror`): tree walk, folder cache, task queue
//! - **Concurrency Controller** (`pool`): bounded worker pool
//! - **Progress Aggregate** (`progress`): atomic counters shared by workers
//! - **Transfer Engine** (`engine`): host-facing facade over all of the above
//!
//! Remote and local I/O go through the `RemoteStore` and `LocalFilesystem`
//! traits from `bridge-traits`; this crate never talks HTTP itself.

pub mod context;
pub mod dedup;
pub mod download;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod mirror;
pub mod pool;
pub mod progress;
pub mod report;
pub mod retry;
pub mod task;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use context::TransferContext;
pub use dedup::DedupChecker;
pub use download::{
    part_path, plan_ranges, ByteRange, ChunkedDownloadSession, DownloadJob, DownloadRequest,
};
pub use engine::TransferEngine;
pub use error::{Result, TransferError};
pub use hasher::ContentHasher;
pub use mirror::{DirectoryMirror, FolderCache, MirrorRequest};
pub use pool::ConcurrencyController;
pub use progress::{ProgressAggregate, ProgressSnapshot};
pub use report::{FailedTask, TransferReport};
pub use task::{ConflictPolicy, LocalEntry, PoolTask, TaskOutcome, TaskStatus, TransferTask};
pub use upload::{ChunkedUploadSession, UploadSession, UploadState};
