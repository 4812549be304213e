//! Storage abstractions for snapshot persistence.
//!
//! The store is shared by every domain worker. Each domain owns exactly one
//! record; the store as a whole carries a single revision counter that moves
//! forward on every commit. Writers use optimistic concurrency: a commit
//! names the revision it was based on and is refused as stale when the store
//! has moved since.
//!
//! ## Directory Structure
//!
//! ```text
//! state/
//! ├── HEAD                  # Store revision
//! ├── HEAD.lock             # Present while a commit is in progress
//! └── domains/
//!     ├── acme.json         # One record per domain
//!     └── example.org.json
//! ```

pub mod local;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Snapshot;

// Re-export for convenience
pub use local::LocalStore;

/// Monotonic store revision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Revision(pub u64);

impl Revision {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A domain's snapshot as loaded, with the store revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub revision: Revision,
    /// `None` before the domain's first commit
    pub snapshot: Option<Snapshot>,
}

/// Persisted form of one domain's snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub domain: String,
    /// Store revision that wrote this record
    pub revision: Revision,
    pub updated_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

/// Result of a single commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitAttempt {
    /// Written; the store is now at this revision
    Committed(Revision),
    /// The store moved past the base revision; nothing was written
    Stale { head: Revision },
    /// The domain's own record was rewritten after the base revision
    Conflict { written: Revision },
    /// Another writer held the store for the whole wait
    Locked,
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load a domain's snapshot together with the current store revision.
    async fn load(&self, domain: &str) -> Result<StoredSnapshot>;

    /// Revision that last wrote the domain's record, if any.
    async fn written_at(&self, domain: &str) -> Result<Option<Revision>>;

    /// Write the domain's record if the store is still at `base`.
    async fn try_commit(
        &self,
        domain: &str,
        base: Revision,
        snapshot: &Snapshot,
    ) -> Result<CommitAttempt>;

    /// Write the domain's record at the current head, provided the record
    /// itself has not been rewritten since `base`.
    ///
    /// The check and the write happen in one critical section, so sibling
    /// domains committing concurrently never make this fail.
    async fn rebase_commit(
        &self,
        domain: &str,
        base: Revision,
        snapshot: &Snapshot,
    ) -> Result<CommitAttempt>;
}
