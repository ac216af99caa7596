//! # Core Configuration Module
//!
//! Provides configuration management for the transfer engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all necessary collaborators and tunables. It enforces
//! fail-fast validation so a missing collaborator is reported before any
//! transfer starts.
//!
//! ## Required Dependencies
//!
//! - `RemoteStore` - The cloud storage account transfers are run against
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `LocalFilesystem` - Local I/O (desktop default: tokio fs)
//! - `EventBus` - Progress events (default: a fresh bus nobody listens to)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, TransferSettings};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .remote_store(Arc::new(store))
//!     .settings(TransferSettings::default().with_mirror_workers(8))
//!     .build()?;
//! ```
//!
//! Settings can also be loaded from JSON; missing keys keep their defaults:
//!
//! ```
//! use core_runtime::config::TransferSettings;
//!
//! let settings = TransferSettings::from_json(r#"{ "download_workers": 4 }"#).unwrap();
//! assert_eq!(settings.download_workers, 4);
//! assert_eq!(settings.mirror_workers, 5);
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{LocalFilesystem, RemoteStore, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Directory names excluded from mirroring unless overridden.
pub const DEFAULT_SKIP_DIRS: &[&str] = &["venv", ".idea", "__pycache__", ".git", "node_modules"];

/// Tunables for hashing, chunking, pacing and concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Upload part size in bytes
    pub part_size: u64,
    /// Read block size used while hashing
    pub hash_block_size: usize,
    /// Files larger than this get `finalize_delay_ms` before finalization
    pub large_file_threshold: u64,
    pub finalize_delay_ms: u64,
    /// Pause after each subfolder creation while mirroring
    pub folder_create_delay_ms: u64,
    /// Default worker limit for directory mirroring
    pub mirror_workers: usize,
    /// Default range count for chunked downloads
    pub download_workers: usize,
    /// Directory name substrings excluded from traversal
    pub skip_dirs: Vec<String>,
    /// Retry policy for idempotent remote calls. A single attempt fails immediately.
    pub retry: RetryPolicy,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            part_size: 5 * MIB,
            hash_block_size: 64 * 1024,
            large_file_threshold: 64 * MIB,
            finalize_delay_ms: 3_000,
            folder_create_delay_ms: 200,
            mirror_workers: 5,
            download_workers: 8,
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
            retry: RetryPolicy::no_retry(),
        }
    }
}

impl TransferSettings {
    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid transfer settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn finalize_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_delay_ms)
    }

    pub fn folder_create_delay(&self) -> Duration {
        Duration::from_millis(self.folder_create_delay_ms)
    }

    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    pub fn with_mirror_workers(mut self, workers: usize) -> Self {
        self.mirror_workers = workers;
        self
    }

    pub fn with_download_workers(mut self, workers: usize) -> Self {
        self.download_workers = workers;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Remove every pacing delay. Intended for tests and local stores.
    pub fn without_delays(mut self) -> Self {
        self.finalize_delay_ms = 0;
        self.folder_create_delay_ms = 0;
        self
    }

    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(Error::invalid("part_size", "must be greater than 0"));
        }

        if self.hash_block_size == 0 {
            return Err(Error::invalid("hash_block_size", "must be greater than 0"));
        }

        if self.mirror_workers == 0 {
            return Err(Error::invalid("mirror_workers", "must be at least 1"));
        }

        if self.download_workers == 0 {
            return Err(Error::invalid("download_workers", "must be at least 1"));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::invalid("retry.max_attempts", "must be at least 1"));
        }

        Ok(())
    }
}

/// Core configuration for the transfer engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Remote object store (required)
    pub remote_store: Arc<dyn RemoteStore>,

    /// Local file system access (optional with desktop default)
    pub file_system: Arc<dyn LocalFilesystem>,

    /// Tunables
    pub settings: TransferSettings,

    /// Bus progress events are published on
    pub event_bus: EventBus,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("remote_store", &"RemoteStore { ... }")
            .field("file_system", &"LocalFilesystem { ... }")
            .field("settings", &self.settings)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

fn remote_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "RemoteStore".to_string(),
        message: "A RemoteStore implementation is required to run transfers. \
                 Desktop: construct a provider (e.g. provider-pan123) over ReqwestHttpClient. \
                 Tests: inject an in-memory store."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn LocalFilesystem>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn LocalFilesystem> = Arc::new(TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn LocalFilesystem>> {
    Err(Error::CapabilityMissing {
        capability: "LocalFilesystem".to_string(),
        message: "LocalFilesystem implementation is required for local I/O. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioFileSystem."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    remote_store: Option<Arc<dyn RemoteStore>>,
    file_system: Option<Arc<dyn LocalFilesystem>>,
    settings: Option<TransferSettings>,
    event_bus: Option<EventBus>,
}

impl CoreConfigBuilder {
    /// Sets the remote store implementation.
    pub fn remote_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.remote_store = Some(store);
        self
    }

    /// Sets the local file system implementation.
    ///
    /// If not provided, `TokioFileSystem` is used when the `desktop-shims`
    /// feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn LocalFilesystem>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn settings(mut self, settings: TransferSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Publish progress on an existing bus instead of a private one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds the final `CoreConfig`, validating required collaborators.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` if no `RemoteStore` was provided, or no
    ///   `LocalFilesystem` was provided and no desktop default is compiled in
    /// - `Config` if the settings fail validation
    pub fn build(self) -> Result<CoreConfig> {
        let remote_store = self.remote_store.ok_or_else(remote_store_missing_error)?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let settings = self.settings.unwrap_or_default();
        settings.validate()?;

        Ok(CoreConfig {
            remote_store,
            file_system,
            settings,
            event_bus: self.event_bus.unwrap_or_default(),
        })
    }
}
