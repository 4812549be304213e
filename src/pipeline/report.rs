//! Report assembly: diff categories rendered as labeled text sections.

use serde::{Deserialize, Serialize};

use super::diff::{DiffResult, FeedItem};

/// Rendered text block for one non-empty diff category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub label: &'static str,
    pub count: usize,
    /// Newline-joined identifiers, verbatim
    pub body: String,
}

impl ReportSection {
    fn new(label: &'static str, items: Vec<String>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self {
            label,
            count: items.len(),
            body: items.join("\n"),
        })
    }

    /// The text the batcher packs into messages.
    pub fn render(&self) -> String {
        format!("**{} ({}):**\n{}\n", self.label, self.count, self.body)
    }
}

pub const NEW_PAGES: &str = "New pages";
pub const CHANGED_PAGES: &str = "Changed pages";
pub const CHANGED_ASSETS: &str = "Changed assets";
pub const UPDATED_REPOS: &str = "Updated repositories";
pub const NEW_FEED_ENTRIES: &str = "New feed entries";

fn feed_line(item: &FeedItem) -> String {
    format!("{} — {}", item.title, item.link)
}

/// Convert a diff into ordered sections, skipping empty categories.
pub fn assemble(diff: &DiffResult) -> Vec<ReportSection> {
    [
        ReportSection::new(NEW_PAGES, diff.new_pages.clone()),
        ReportSection::new(CHANGED_PAGES, diff.changed_pages.clone()),
        ReportSection::new(CHANGED_ASSETS, diff.changed_asset_pages.clone()),
        ReportSection::new(UPDATED_REPOS, diff.updated_repos.clone()),
        ReportSection::new(
            NEW_FEED_ENTRIES,
            diff.new_feed_entries.iter().map(feed_line).collect(),
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Count and ordered items for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub count: usize,
    pub items: Vec<String>,
}

impl From<Vec<String>> for CategorySummary {
    fn from(items: Vec<String>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// Per-domain summary of one run: five `(count, items)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub new_pages: CategorySummary,
    pub changed_pages: CategorySummary,
    pub changed_assets: CategorySummary,
    pub updated_repos: CategorySummary,
    pub new_feed_entries: CategorySummary,
}

impl ChangeSummary {
    pub fn total(&self) -> usize {
        self.new_pages.count
            + self.changed_pages.count
            + self.changed_assets.count
            + self.updated_repos.count
            + self.new_feed_entries.count
    }
}

impl From<&DiffResult> for ChangeSummary {
    fn from(diff: &DiffResult) -> Self {
        Self {
            new_pages: diff.new_pages.clone().into(),
            changed_pages: diff.changed_pages.clone().into(),
            changed_assets: diff.changed_asset_pages.clone().into(),
            updated_repos: diff.updated_repos.clone().into(),
            new_feed_entries: diff
                .new_feed_entries
                .iter()
                .map(feed_line)
                .collect::<Vec<_>>()
                .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff() -> DiffResult {
        DiffResult {
            new_pages: vec!["https://a.org/new".into()],
            changed_pages: vec![],
            changed_asset_pages: vec!["https://a.org/".into()],
            updated_repos: vec!["a/site".into(), "a/docs".into()],
            new_feed_entries: vec![FeedItem {
                feed_url: "https://a.org/feed".into(),
                title: "Launch <b>day</b>".into(),
                link: "https://a.org/p/1".into(),
            }],
        }
    }

    #[test]
    fn test_sections_skip_empty_and_keep_order() {
        let sections = assemble(&diff());
        let labels: Vec<_> = sections.iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            vec![NEW_PAGES, CHANGED_ASSETS, UPDATED_REPOS, NEW_FEED_ENTRIES]
        );
        assert_eq!(sections[2].count, 2);
        assert_eq!(sections[2].body, "a/site\na/docs");
    }

    #[test]
    fn test_feed_entries_rendered_verbatim() {
        let sections = assemble(&diff());
        assert_eq!(sections[3].body, "Launch <b>day</b> — https://a.org/p/1");
    }

    #[test]
    fn test_render() {
        let sections = assemble(&diff());
        assert_eq!(
            sections[0].render(),
            "**New pages (1):**\nhttps://a.org/new\n"
        );
    }

    #[test]
    fn test_empty_diff_has_no_sections() {
        assert!(assemble(&DiffResult::default()).is_empty());
    }

    #[test]
    fn test_change_summary() {
        let summary = ChangeSummary::from(&diff());
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.changed_pages.count, 0);
        assert_eq!(summary.updated_repos.items, vec!["a/site", "a/docs"]);
    }
}
