//! State commit with one rebase-and-retry.
//!
//! Each domain owns exactly one record in the shared store, so a commit
//! refused because a sibling domain moved the store can be replayed on top
//! of the new head without losing either update. Only a concurrent rewrite
//! of this domain's own record is irreconcilable.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::Snapshot;
use crate::storage::{CommitAttempt, Revision, SnapshotStore};

/// Persists a domain's next snapshot against the shared store.
#[derive(Clone)]
pub struct StateCommitter {
    store: Arc<dyn SnapshotStore>,
}

impl StateCommitter {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Commit `snapshot` for `domain`, based on the revision it was loaded at.
    ///
    /// Returns the store revision the record was written at.
    pub async fn commit(&self, domain: &str, base: Revision, snapshot: &Snapshot) -> Result<Revision> {
        match self.store.try_commit(domain, base, snapshot).await? {
            CommitAttempt::Committed(revision) => return Ok(revision),
            CommitAttempt::Stale { head } => {
                log::info!("[{}] Store advanced {} -> {}; rebasing", domain, base, head);
            }
            CommitAttempt::Locked => {
                log::info!("[{}] Store locked by another writer; retrying once", domain);
            }
            CommitAttempt::Conflict { written } => {
                return Err(Self::rewritten(domain, base, written));
            }
        }

        // Rebase: only sibling records may have moved
        match self.store.rebase_commit(domain, base, snapshot).await? {
            CommitAttempt::Committed(revision) => Ok(revision),
            CommitAttempt::Conflict { written } => Err(Self::rewritten(domain, base, written)),
            CommitAttempt::Locked => Err(AppError::commit_conflict(
                domain,
                "store locked by another writer during retry",
            )),
            CommitAttempt::Stale { head } => Err(AppError::commit_conflict(
                domain,
                format!("store moved to {head} during retry"),
            )),
        }
    }

    fn rewritten(domain: &str, base: Revision, written: Revision) -> AppError {
        log::warn!(
            "[{}] Own record rewritten at {} after base {}; not overwriting",
            domain,
            written,
            base
        );
        AppError::commit_conflict(
            domain,
            format!("record rewritten at {written} after base {base}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::storage::{LocalStore, StoredSnapshot};

    fn snapshot(pages: &[&str]) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.pages = pages.iter().map(|p| p.to_string()).collect();
        snapshot
    }

    #[tokio::test]
    async fn test_commit_at_current_head() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let committer = StateCommitter::new(store.clone());

        let base = store.load("acme").await.unwrap().revision;
        let revision = committer
            .commit("acme", base, &snapshot(&["a"]))
            .await
            .unwrap();
        assert_eq!(revision, Revision(1));
    }

    #[tokio::test]
    async fn test_sibling_commit_is_rebased_over() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let committer = StateCommitter::new(store.clone());

        // Both workers load at r0
        let base_a = store.load("alpha").await.unwrap().revision;
        let base_b = store.load("beta").await.unwrap().revision;

        // Beta finishes first
        committer
            .commit("beta", base_b, &snapshot(&["b1", "b2"]))
            .await
            .unwrap();

        // Alpha finds the store advanced and retries once on top
        let revision = committer
            .commit("alpha", base_a, &snapshot(&["a1"]))
            .await
            .unwrap();
        assert_eq!(revision, Revision(2));

        let alpha = store.load("alpha").await.unwrap();
        let beta = store.load("beta").await.unwrap();
        assert_eq!(alpha.revision, Revision(2));
        assert_eq!(alpha.snapshot, Some(snapshot(&["a1"])));
        assert_eq!(beta.snapshot, Some(snapshot(&["b1", "b2"])));
    }

    #[tokio::test]
    async fn test_own_record_rewritten_is_a_conflict() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let committer = StateCommitter::new(store.clone());

        let stale_base = store.load("acme").await.unwrap().revision;
        committer
            .commit("acme", stale_base, &snapshot(&["new"]))
            .await
            .unwrap();

        let err = committer
            .commit("acme", stale_base, &snapshot(&["old"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CommitConflict { .. }));

        // The newer record survives
        let loaded = store.load("acme").await.unwrap();
        assert_eq!(loaded.snapshot, Some(snapshot(&["new"])));
    }

    /// A store another writer never lets go of: every attempt fails.
    struct RacingStore {
        attempts: Mutex<u64>,
    }

    impl RacingStore {
        fn attempt(&self) -> u64 {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        }
    }

    #[async_trait]
    impl SnapshotStore for RacingStore {
        async fn load(&self, _domain: &str) -> Result<StoredSnapshot> {
            Ok(StoredSnapshot {
                revision: Revision(0),
                snapshot: None,
            })
        }

        async fn written_at(&self, _domain: &str) -> Result<Option<Revision>> {
            Ok(None)
        }

        async fn try_commit(
            &self,
            _domain: &str,
            _base: Revision,
            _snapshot: &Snapshot,
        ) -> Result<CommitAttempt> {
            Ok(CommitAttempt::Stale {
                head: Revision(self.attempt()),
            })
        }

        async fn rebase_commit(
            &self,
            _domain: &str,
            _base: Revision,
            _snapshot: &Snapshot,
        ) -> Result<CommitAttempt> {
            self.attempt();
            Ok(CommitAttempt::Locked)
        }
    }

    #[tokio::test]
    async fn test_retries_exactly_once() {
        let store = Arc::new(RacingStore {
            attempts: Mutex::new(0),
        });
        let committer = StateCommitter::new(store.clone());

        let err = committer
            .commit("acme", Revision(0), &snapshot(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CommitConflict { .. }));
        assert_eq!(*store.attempts.lock().unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_commits_all_land() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let committer = StateCommitter::new(store.clone());
        let names: Vec<String> = (0..12).map(|i| format!("site{i}")).collect();

        // Every worker loaded at r0 before any of them committed
        let mut tasks = tokio::task::JoinSet::new();
        for name in names.clone() {
            let committer = committer.clone();
            tasks.spawn(async move {
                committer
                    .commit(&name, Revision(0), &snapshot(&[name.as_str()]))
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        assert_eq!(store.head().await.unwrap(), Revision(names.len() as u64));
        for name in &names {
            let loaded = store.load(name).await.unwrap();
            assert_eq!(loaded.snapshot, Some(snapshot(&[name.as_str()])));
        }
    }
}
