//! Change detection between a stored snapshot and a fresh observation set.
//!
//! Computes the five diff categories (new pages, changed pages, changed
//! assets, updated repositories, new feed entries) and the snapshot that
//! replaces the stored one. Pure: inputs are never mutated and identical
//! inputs always yield identical outputs.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{DiffPolicy, Observation, Snapshot};

/// A feed entry reported as new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub feed_url: String,
    pub title: String,
    pub link: String,
}

/// Changes detected for one domain in one run. Ordered as fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub new_pages: Vec<String>,
    pub changed_pages: Vec<String>,
    pub changed_asset_pages: Vec<String>,
    pub updated_repos: Vec<String>,
    pub new_feed_entries: Vec<FeedItem>,
}

impl DiffResult {
    /// Check if any category is non-empty.
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    /// Get the total number of changes across categories.
    pub fn change_count(&self) -> usize {
        self.new_pages.len()
            + self.changed_pages.len()
            + self.changed_asset_pages.len()
            + self.updated_repos.len()
            + self.new_feed_entries.len()
    }
}

/// Diff plus the snapshot that replaces the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    pub diff: DiffResult,
    pub next: Snapshot,
}

/// Calculator for diffing fresh observations against a snapshot.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    policy: DiffPolicy,
}

impl DiffEngine {
    /// Create a diff engine with the given first-sight policy.
    pub fn new(policy: DiffPolicy) -> Self {
        Self { policy }
    }

    /// Calculate the diff between the stored snapshot and fresh observations.
    ///
    /// `previous` is `None` on a domain's first run.
    pub fn calculate(
        &self,
        previous: Option<&Snapshot>,
        fresh: &[Observation],
    ) -> Result<DiffOutcome> {
        check_unique(fresh)?;

        let next = build_snapshot(fresh);

        let empty = Snapshot::default();
        let previous = match previous {
            Some(snapshot) => snapshot,
            None if self.policy.baseline_new_domains => {
                return Ok(DiffOutcome {
                    diff: DiffResult::default(),
                    next,
                });
            }
            None => &empty,
        };

        let mut diff = DiffResult::default();

        for observation in fresh {
            match observation {
                Observation::PageUrl { url } => {
                    if !previous.pages.contains(url) {
                        diff.new_pages.push(url.clone());
                    }
                }
                Observation::PageContent { url, content_hash } => {
                    if let Some(old) = previous.page_hashes.get(url) {
                        if old != content_hash {
                            diff.changed_pages.push(url.clone());
                        }
                    }
                }
                Observation::AssetSet {
                    page_url,
                    asset_hashes,
                } => {
                    if let Some(old) = previous.asset_hashes.get(page_url) {
                        if old != asset_hashes {
                            diff.changed_asset_pages.push(page_url.clone());
                        }
                    }
                }
                Observation::RepoState { repo_id, marker } => {
                    let updated = match previous.repos.get(repo_id) {
                        Some(old) => old != marker,
                        None => !self.policy.baseline_new_repos,
                    };
                    if updated {
                        diff.updated_repos.push(repo_id.clone());
                    }
                }
                Observation::FeedEntry {
                    feed_url,
                    entry_id,
                    title,
                    link,
                } => {
                    let is_new = match previous.feed_entries.get(feed_url) {
                        Some(seen) => !seen.contains(entry_id),
                        None => !self.policy.baseline_new_feeds,
                    };
                    if is_new {
                        diff.new_feed_entries.push(FeedItem {
                            feed_url: feed_url.clone(),
                            title: title.clone(),
                            link: link.clone(),
                        });
                    }
                }
            }
        }

        Ok(DiffOutcome { diff, next })
    }
}

/// Convenience function to calculate a diff with the default policy.
pub fn calculate_diff(previous: Option<&Snapshot>, fresh: &[Observation]) -> Result<DiffOutcome> {
    DiffEngine::default().calculate(previous, fresh)
}

/// Reject batches where one kind carries the same identity key twice.
fn check_unique(fresh: &[Observation]) -> Result<()> {
    let mut seen = HashSet::new();
    for observation in fresh {
        let kind = observation.kind();
        let key = observation.identity();
        if !seen.insert((kind, key.clone())) {
            return Err(AppError::DiffInconsistency {
                kind: kind.to_string(),
                key,
            });
        }
    }
    Ok(())
}

/// Each sub-map becomes exactly the fresh observation set.
fn build_snapshot(fresh: &[Observation]) -> Snapshot {
    let mut next = Snapshot::default();
    for observation in fresh {
        match observation {
            Observation::PageUrl { url } => {
                next.pages.insert(url.clone());
            }
            Observation::PageContent { url, content_hash } => {
                next.page_hashes.insert(url.clone(), content_hash.clone());
            }
            Observation::AssetSet {
                page_url,
                asset_hashes,
            } => {
                next.asset_hashes
                    .insert(page_url.clone(), asset_hashes.clone());
            }
            Observation::RepoState { repo_id, marker } => {
                next.repos.insert(repo_id.clone(), marker.clone());
            }
            Observation::FeedEntry {
                feed_url, entry_id, ..
            } => {
                next.feed_entries
                    .entry(feed_url.clone())
                    .or_insert_with(BTreeSet::new)
                    .insert(entry_id.clone());
            }
        }
    }
    next
}
