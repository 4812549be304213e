//! Observation records produced by the fetchers.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The five kinds of observation, one per snapshot sub-map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    PageUrl,
    PageContent,
    AssetSet,
    RepoState,
    FeedEntry,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::PageUrl => "page_url",
            ObservationKind::PageContent => "page_content",
            ObservationKind::AssetSet => "asset_set",
            ObservationKind::RepoState => "repo_state",
            ObservationKind::FeedEntry => "feed_entry",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fetch result for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// A page URL listed in the sitemap
    PageUrl { url: String },

    /// Hash of a monitored page's (selected) content
    PageContent { url: String, content_hash: String },

    /// Hashes of every asset referenced by a page
    AssetSet {
        page_url: String,
        asset_hashes: BTreeSet<String>,
    },

    /// Latest commit or release marker of a repository
    RepoState { repo_id: String, marker: String },

    /// One entry of a syndication feed
    FeedEntry {
        feed_url: String,
        entry_id: String,
        title: String,
        link: String,
    },
}

impl Observation {
    pub fn page_url(url: impl Into<String>) -> Self {
        Self::PageUrl { url: url.into() }
    }

    pub fn page_content(url: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self::PageContent {
            url: url.into(),
            content_hash: content_hash.into(),
        }
    }

    pub fn asset_set<I, S>(page_url: impl Into<String>, hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AssetSet {
            page_url: page_url.into(),
            asset_hashes: hashes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn repo_state(repo_id: impl Into<String>, marker: impl Into<String>) -> Self {
        Self::RepoState {
            repo_id: repo_id.into(),
            marker: marker.into(),
        }
    }

    pub fn feed_entry(
        feed_url: impl Into<String>,
        entry_id: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self::FeedEntry {
            feed_url: feed_url.into(),
            entry_id: entry_id.into(),
            title: title.into(),
            link: link.into(),
        }
    }

    pub fn kind(&self) -> ObservationKind {
        match self {
            Observation::PageUrl { .. } => ObservationKind::PageUrl,
            Observation::PageContent { .. } => ObservationKind::PageContent,
            Observation::AssetSet { .. } => ObservationKind::AssetSet,
            Observation::RepoState { .. } => ObservationKind::RepoState,
            Observation::FeedEntry { .. } => ObservationKind::FeedEntry,
        }
    }

    /// Stable identity used to match observations across runs.
    ///
    /// Feed entries are keyed by feed URL and entry ID together, since the
    /// same entry ID may legitimately appear in two different feeds.
    pub fn identity(&self) -> String {
        match self {
            Observation::PageUrl { url } | Observation::PageContent { url, .. } => url.clone(),
            Observation::AssetSet { page_url, .. } => page_url.clone(),
            Observation::RepoState { repo_id, .. } => repo_id.clone(),
            Observation::FeedEntry {
                feed_url, entry_id, ..
            } => format!("{feed_url}#{entry_id}"),
        }
    }
}
