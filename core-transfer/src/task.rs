//! # Transfer Units
//!
//! Immutable work items, their outcomes, and the caller-chosen conflict policy.

use crate::error::{Result, TransferError};
use crate::hasher::ContentHasher;
use bridge_traits::{DuplicateMode, LocalFilesystem};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::OnceCell;

// ============================================================================
// Conflict Policy
// ============================================================================

/// What to do when the target folder already holds a same-named object
/// with different content. Chosen before a run starts; never prompted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Let the store assign a disambiguated name
    KeepBoth,
    /// Delete the existing object, then upload
    Overwrite,
    /// Report the file as failed
    #[default]
    Fail,
}

impl ConflictPolicy {
    /// Duplicate mode for the re-declaration after a conflict, if any.
    pub fn duplicate_mode(&self) -> Option<DuplicateMode> {
        match self {
            ConflictPolicy::KeepBoth => Some(DuplicateMode::KeepBoth),
            ConflictPolicy::Overwrite => Some(DuplicateMode::Overwrite),
            ConflictPolicy::Fail => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::KeepBoth => "keep-both",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Fail => "fail",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "keep-both" | "keep_both" | "keep" => Ok(ConflictPolicy::KeepBoth),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "fail" => Ok(ConflictPolicy::Fail),
            _ => Err(TransferError::Config(format!(
                "Unknown conflict policy: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Local Entries
// ============================================================================

/// Read-only view of one local path.
///
/// Size and digest are computed lazily and cached, so each is obtained at
/// most once no matter how many stages ask for it.
#[derive(Debug)]
pub struct LocalEntry {
    path: PathBuf,
    size: OnceCell<u64>,
    digest: OnceCell<String>,
}

impl LocalEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: OnceCell::new(),
            digest: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn size(&self, fs: &dyn LocalFilesystem) -> Result<u64> {
        let size = self
            .size
            .get_or_try_init(|| async {
                let metadata = fs.metadata(&self.path).await?;
                if metadata.is_directory {
                    return Err(TransferError::IoFailure(format!(
                        "{} is a directory",
                        self.path.display()
                    )));
                }
                Ok::<u64, TransferError>(metadata.size)
            })
            .await?;
        Ok(*size)
    }

    pub async fn digest(&self, hasher: &ContentHasher) -> Result<&str> {
        let digest = self
            .digest
            .get_or_try_init(|| hasher.hash(&self.path))
            .await?;
        Ok(digest.as_str())
    }
}

// ============================================================================
// Tasks and Outcomes
// ============================================================================

/// One file to upload into one remote folder. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub local_path: PathBuf,
    pub target_folder_id: String,
}

impl TransferTask {
    pub fn new(local_path: impl Into<PathBuf>, target_folder_id: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            target_folder_id: target_folder_id.into(),
        }
    }

    /// Remote object name: the local file name.
    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.local_path.display().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Skipped,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one task, reported independently of its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// File path or range label an operator can act on
    pub label: String,
    pub status: TaskStatus,
    pub bytes_sent: u64,
    /// True when the store short-circuited the upload with existing content
    pub reused: bool,
    pub error: Option<TransferError>,
}

impl TaskOutcome {
    pub fn success(label: impl Into<String>, bytes_sent: u64) -> Self {
        Self {
            label: label.into(),
            status: TaskStatus::Success,
            bytes_sent,
            reused: false,
            error: None,
        }
    }

    pub fn reused(label: impl Into<String>) -> Self {
        Self {
            reused: true,
            ..Self::success(label, 0)
        }
    }

    pub fn skipped(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: TaskStatus::Skipped,
            bytes_sent: 0,
            reused: false,
            error: None,
        }
    }

    pub fn failed(label: impl Into<String>, error: TransferError) -> Self {
        Self {
            label: label.into(),
            status: TaskStatus::Failed,
            bytes_sent: 0,
            reused: false,
            error: Some(error),
        }
    }

    pub fn reason(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Anything the worker pool can run needs a human-readable label.
pub trait PoolTask: Send + 'static {
    fn label(&self) -> String;
}

impl PoolTask for TransferTask {
    fn label(&self) -> String {
        self.local_path.display().to_string()
    }
}
