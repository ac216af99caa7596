//! # Dedup Checker
//!
//! Decides whether a remote folder already holds an identical file. The check
//! is advisory: a stale listing can only cause a redundant upload, never a
//! skipped one, because a match requires both name and digest.

use crate::error::{Result, TransferError};
use crate::retry::with_retry;
use bridge_traits::{RemoteEntry, RemoteStore, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct DedupChecker {
    store: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
}

impl DedupChecker {
    pub fn new(store: Arc<dyn RemoteStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Fresh listing of `folder_id`.
    async fn listing(&self, folder_id: &str) -> Result<Vec<RemoteEntry>> {
        let store = self.store.as_ref();
        with_retry(&self.retry, "list_directory", || async move {
            store
                .list_directory(folder_id)
                .await
                .map_err(TransferError::from)
        })
        .await
    }

    /// True only if `folder_id` holds a file named `file_name` whose digest
    /// equals `digest` (case-insensitive). A listing failure counts as "not
    /// present" so the file is uploaded rather than silently skipped.
    #[instrument(skip(self, digest))]
    pub async fn exists(&self, folder_id: &str, file_name: &str, digest: &str) -> bool {
        match self.listing(folder_id).await {
            Ok(entries) => {
                let found = entries
                    .iter()
                    .any(|entry| entry.matches_content(file_name, digest));
                debug!(found, entries = entries.len(), "Dedup check complete");
                found
            }
            Err(e) => {
                warn!(error = %e, "Listing failed during dedup check, assuming absent");
                false
            }
        }
    }

    /// The same-named file in `folder_id`, whatever its content.
    pub async fn same_named_file(
        &self,
        folder_id: &str,
        file_name: &str,
    ) -> Result<Option<RemoteEntry>> {
        let entries = self.listing(folder_id).await?;
        Ok(entries
            .into_iter()
            .find(|entry| !entry.is_directory && entry.name == file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{remote_file, MockStore};
    use bridge_traits::BridgeError;

    const DIGEST: &str = "900150983cd24fb0d6963f7d28e17f72";

    fn checker(store: MockStore) -> DedupChecker {
        DedupChecker::new(Arc::new(store), RetryPolicy::no_retry())
    }

    fn store_with(entries: Vec<RemoteEntry>) -> MockStore {
        let mut store = MockStore::new();
        store
            .expect_list_directory()
            .returning(move |_| Ok(entries.clone()));
        store
    }

    #[tokio::test]
    async fn test_exact_match_is_duplicate() {
        let checker = checker(store_with(vec![remote_file(
            "1",
            "a.txt",
            &DIGEST.to_uppercase(),
        )]));
        assert!(checker.exists("0", "a.txt", DIGEST).await);
    }

    #[tokio::test]
    async fn test_name_or_digest_mismatch_is_not_duplicate() {
        let checker = checker(store_with(vec![
            remote_file("1", "a.txt", "ffffffffffffffffffffffffffffffff"),
            remote_file("2", "b.txt", DIGEST),
        ]));
        assert!(!checker.exists("0", "a.txt", DIGEST).await);
        assert!(!checker.exists("0", "c.txt", DIGEST).await);
    }

    #[tokio::test]
    async fn test_folder_with_same_name_is_not_duplicate() {
        let mut folder = remote_file("1", "a.txt", DIGEST);
        folder.is_directory = true;
        let checker = checker(store_with(vec![folder]));
        assert!(!checker.exists("0", "a.txt", DIGEST).await);
        assert!(checker.same_named_file("0", "a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_failure_is_false_negative() {
        let mut store = MockStore::new();
        store
            .expect_list_directory()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("timeout".into())));

        assert!(!checker(store).exists("0", "a.txt", DIGEST).await);
    }

    #[tokio::test]
    async fn test_same_named_file_ignores_digest() {
        let checker = checker(store_with(vec![remote_file("9", "a.txt", "abc")]));
        let entry = checker.same_named_file("0", "a.txt").await.unwrap().unwrap();
        assert_eq!(entry.id, "9");
    }
}
