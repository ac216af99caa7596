//! Explicit context shared by every worker of a run.

use crate::dedup::DedupChecker;
use crate::hasher::ContentHasher;
use bridge_traits::{LocalFilesystem, RemoteStore, RetryPolicy};
use core_runtime::config::{CoreConfig, TransferSettings};
use core_runtime::events::EventBus;
use std::sync::Arc;

/// Collaborators and tunables, cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct TransferContext {
    pub store: Arc<dyn RemoteStore>,
    pub fs: Arc<dyn LocalFilesystem>,
    pub settings: Arc<TransferSettings>,
    pub events: EventBus,
}

impl TransferContext {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        fs: Arc<dyn LocalFilesystem>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            store,
            fs,
            settings: Arc::new(settings),
            events: EventBus::default(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            store: Arc::clone(&config.remote_store),
            fs: Arc::clone(&config.file_system),
            settings: Arc::new(config.settings.clone()),
            events: config.event_bus.clone(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.settings.retry
    }

    pub fn hasher(&self) -> ContentHasher {
        ContentHasher::new(Arc::clone(&self.fs), self.settings.hash_block_size)
    }

    pub fn dedup(&self) -> DedupChecker {
        DedupChecker::new(Arc::clone(&self.store), self.settings.retry.clone())
    }
}

impl std::fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferContext")
            .field("settings", &self.settings)
            .field("events", &self.events)
            .finish()
    }
}
