//! Local filesystem storage implementation.
//!
//! Versioned JSON store: every commit bumps `HEAD` and rewrites exactly one
//! domain record. All writes go through a temp file and a rename, and a
//! commit holds `HEAD.lock` (created exclusively) for its check-and-write
//! so separate processes sharing the directory cannot interleave. Within one
//! process the same section is additionally serialized by an async mutex.
//! A writer finding the lock held polls for it for a bounded time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::Snapshot;
use crate::storage::{CommitAttempt, Revision, SnapshotStore, StateRecord, StoredSnapshot};

const HEAD_KEY: &str = "HEAD";
const LOCK_KEY: &str = "HEAD.lock";
const DOMAINS_DIR: &str = "domains";

/// A lock older than this is assumed to belong to a crashed writer.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(600);

/// How long a commit waits for another writer's lock.
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HeadRecord {
    revision: Revision,
    updated_at: DateTime<Utc>,
}

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
    commit_lock: Arc<Mutex<()>>,
    lock_wait: Duration,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            commit_lock: Arc::new(Mutex::new(())),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Set how long a commit waits for `HEAD.lock` held by another writer.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Current store revision (`r0` for an empty store).
    pub async fn head(&self) -> Result<Revision> {
        Ok(self
            .read_json::<HeadRecord>(HEAD_KEY)
            .await?
            .map(|h| h.revision)
            .unwrap_or_default())
    }

    /// Full record for a domain, if it has been committed.
    pub async fn record(&self, domain: &str) -> Result<Option<StateRecord>> {
        self.read_json(&Self::domain_key(domain)?).await
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn domain_key(domain: &str) -> Result<String> {
        if domain.is_empty() || domain.starts_with('.') || domain.contains(['/', '\\']) {
            return Err(AppError::validation(format!(
                "'{domain}' cannot name a state record"
            )));
        }
        Ok(format!("{DOMAINS_DIR}/{domain}.json"))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = PathBuf::from(format!("{}.tmp", path.display()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn lock_store(&self, domain: &str) -> Result<Option<LockFile>> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        let lock = LockFile::acquire(self.path(LOCK_KEY), self.lock_wait).await?;
        if lock.is_none() {
            log::warn!(
                "[{}] Store still locked by another writer after {:?}",
                domain,
                self.lock_wait
            );
        }
        Ok(lock)
    }

    /// Write the domain record and advance `HEAD`. Caller holds the lock.
    async fn write_at(
        &self,
        key: &str,
        domain: &str,
        revision: Revision,
        snapshot: &Snapshot,
    ) -> Result<CommitAttempt> {
        let now = Utc::now();
        let record = StateRecord {
            domain: domain.to_string(),
            revision,
            updated_at: now,
            snapshot: snapshot.clone(),
        };

        self.write_json(key, &record).await?;
        self.write_json(
            HEAD_KEY,
            &HeadRecord {
                revision,
                updated_at: now,
            },
        )
        .await?;

        log::info!(
            "[{}] Snapshot written to {} at {}",
            domain,
            self.path(key).display(),
            revision
        );
        Ok(CommitAttempt::Committed(revision))
    }
}

/// Exclusive lock file, removed on drop.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Take the lock, polling for up to `wait` while another writer holds it.
    async fn acquire(path: PathBuf, wait: Duration) -> Result<Option<Self>> {
        let deadline = Instant::now() + wait;
        loop {
            if Self::try_acquire(&path).await? {
                return Ok(Some(Self { path }));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    async fn try_acquire(path: &Path) -> Result<bool> {
        if Self::create(path).await? {
            return Ok(true);
        }

        if Self::is_stale(path).await {
            log::warn!("Removing stale lock {}", path.display());
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AppError::Io(e)),
            }
            return Self::create(path).await;
        }

        Ok(false)
    }

    async fn create(path: &Path) -> Result<bool> {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn is_stale(path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > STALE_LOCK_AFTER)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait]
impl SnapshotStore for LocalStore {
    async fn load(&self, domain: &str) -> Result<StoredSnapshot> {
        let key = Self::domain_key(domain)?;
        let revision = self.head().await?;
        let snapshot = self
            .read_json::<StateRecord>(&key)
            .await?
            .map(|record| record.snapshot);

        if snapshot.is_none() {
            log::info!("[{}] No stored snapshot; this run sets the baseline", domain);
        }

        Ok(StoredSnapshot { revision, snapshot })
    }

    async fn written_at(&self, domain: &str) -> Result<Option<Revision>> {
        Ok(self.record(domain).await?.map(|record| record.revision))
    }

    async fn try_commit(
        &self,
        domain: &str,
        base: Revision,
        snapshot: &Snapshot,
    ) -> Result<CommitAttempt> {
        let key = Self::domain_key(domain)?;
        let _serialized = self.commit_lock.lock().await;
        let Some(_lock) = self.lock_store(domain).await? else {
            return Ok(CommitAttempt::Locked);
        };

        let head = self.head().await?;
        if head != base {
            return Ok(CommitAttempt::Stale { head });
        }
        self.write_at(&key, domain, head.next(), snapshot).await
    }

    async fn rebase_commit(
        &self,
        domain: &str,
        base: Revision,
        snapshot: &Snapshot,
    ) -> Result<CommitAttempt> {
        let key = Self::domain_key(domain)?;
        let _serialized = self.commit_lock.lock().await;
        let Some(_lock) = self.lock_store(domain).await? else {
            return Ok(CommitAttempt::Locked);
        };

        if let Some(written) = self.written_at(domain).await? {
            if written > base {
                return Ok(CommitAttempt::Conflict { written });
            }
        }

        let head = self.head().await?;
        self.write_at(&key, domain, head.next(), snapshot).await
    }
}
