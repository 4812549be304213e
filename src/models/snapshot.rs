//! Per-domain snapshot of everything last observed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Last-known observation set for one domain.
///
/// Sorted collections keep the serialized form stable, so loading and
/// re-saving an unchanged snapshot yields identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Page URLs seen in the sitemap
    #[serde(default)]
    pub pages: BTreeSet<String>,

    /// Page URL -> content hash
    #[serde(default)]
    pub page_hashes: BTreeMap<String, String>,

    /// Page URL -> hashes of the assets it references
    #[serde(default)]
    pub asset_hashes: BTreeMap<String, BTreeSet<String>>,

    /// Repository ID -> latest commit/release marker
    #[serde(default)]
    pub repos: BTreeMap<String, String>,

    /// Feed URL -> IDs of entries already seen
    #[serde(default)]
    pub feed_entries: BTreeMap<String, BTreeSet<String>>,
}

impl Snapshot {
    /// True when no sub-map holds anything.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
            && self.page_hashes.is_empty()
            && self.asset_hashes.is_empty()
            && self.repos.is_empty()
            && self.feed_entries.is_empty()
    }

    /// True when this snapshot holds any key `previous` lacks: a page, a
    /// hashed or asset-tracked page, a repository, a feed or a feed entry.
    ///
    /// Removals alone do not count.
    pub fn adds_keys_over(&self, previous: &Snapshot) -> bool {
        !self.pages.is_subset(&previous.pages)
            || self
                .page_hashes
                .keys()
                .any(|url| !previous.page_hashes.contains_key(url))
            || self
                .asset_hashes
                .keys()
                .any(|url| !previous.asset_hashes.contains_key(url))
            || self
                .repos
                .keys()
                .any(|repo| !previous.repos.contains_key(repo))
            || self.feed_entries.iter().any(|(feed, ids)| {
                previous
                    .feed_entries
                    .get(feed)
                    .is_none_or(|seen| !ids.is_subset(seen))
            })
    }

    /// Number of feed entry IDs across all feeds.
    pub fn feed_entry_count(&self) -> usize {
        self.feed_entries.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.pages.insert("https://b.org/2".into());
        snapshot.pages.insert("https://b.org/1".into());
        snapshot
            .page_hashes
            .insert("https://b.org/1".into(), "h1".into());
        snapshot.asset_hashes.insert(
            "https://b.org/1".into(),
            ["x".to_string(), "y".to_string()].into_iter().collect(),
        );
        snapshot.repos.insert("org/repo".into(), "abc123".into());
        snapshot.feed_entries.insert(
            "https://b.org/feed".into(),
            ["e1".to_string()].into_iter().collect(),
        );
        snapshot
    }

    #[test]
    fn test_json_round_trip_is_byte_stable() {
        let original = sample();
        let first = serde_json::to_string_pretty(&original).unwrap();
        let loaded: Snapshot = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string_pretty(&loaded).unwrap();

        assert_eq!(loaded, original);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let loaded: Snapshot = serde_json::from_str(r#"{"pages": ["a"]}"#).unwrap();
        assert_eq!(loaded.pages.len(), 1);
        assert!(loaded.repos.is_empty());
        assert!(!loaded.is_empty());
        assert!(Snapshot::default().is_empty());
    }

    #[test]
    fn test_adds_keys_over() {
        let previous = sample();
        assert!(!previous.adds_keys_over(&previous));

        let mut shrunk = previous.clone();
        shrunk.pages.remove("https://b.org/2");
        shrunk.repos.clear();
        assert!(!shrunk.adds_keys_over(&previous));
        assert!(previous.adds_keys_over(&shrunk));

        let mut repo_added = previous.clone();
        repo_added.repos.insert("org/other".into(), "def456".into());
        assert!(repo_added.adds_keys_over(&previous));

        let mut entry_added = previous.clone();
        entry_added
            .feed_entries
            .get_mut("https://b.org/feed")
            .unwrap()
            .insert("e2".into());
        assert!(entry_added.adds_keys_over(&previous));

        // A changed value under a known key is not a new key
        let mut rehashed = previous.clone();
        rehashed
            .page_hashes
            .insert("https://b.org/1".into(), "h2".into());
        assert!(!rehashed.adds_keys_over(&previous));
    }

    #[test]
    fn test_feed_entry_count() {
        assert_eq!(sample().feed_entry_count(), 1);
    }
}
