//! Monitored domain definitions.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::parse_selector;

/// One monitored organization and what to fetch for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainConfig {
    /// Unique, file-safe name; also names the domain's state record
    pub name: String,

    /// Sitemap (or sitemap index) listing the domain's pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,

    /// Pages whose content is hashed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PageSelector>,

    /// Pages whose referenced scripts, stylesheets and images are hashed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asset_pages: Vec<String>,

    /// Source repositories as `owner/name`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<String>,

    /// RSS or Atom feed URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feeds: Vec<String>,

    /// Overrides `notify.webhook_url` for this domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// A page to hash, optionally narrowed to the elements matching a CSS selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageSelector {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl DomainConfig {
    /// A domain with only a name; targets are added by the caller.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sitemap_url: None,
            pages: Vec::new(),
            asset_pages: Vec::new(),
            repos: Vec::new(),
            feeds: Vec::new(),
            webhook_url: None,
        }
    }

    /// True when at least one fetch target is configured.
    pub fn has_targets(&self) -> bool {
        self.sitemap_url.is_some()
            || !self.pages.is_empty()
            || !self.asset_pages.is_empty()
            || !self.repos.is_empty()
            || !self.feeds.is_empty()
    }

    /// Validate names, URLs and repository identifiers.
    pub fn validate(&self) -> Result<()> {
        let name_re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$")
            .map_err(|e| AppError::validation(e.to_string()))?;
        if !name_re.is_match(&self.name) {
            return Err(AppError::validation(format!(
                "domain name '{}' must be file-safe (letters, digits, '.', '_', '-')",
                self.name
            )));
        }
        if !self.has_targets() {
            return Err(AppError::validation(format!(
                "domain '{}' has nothing to watch",
                self.name
            )));
        }

        let urls = self
            .sitemap_url
            .iter()
            .chain(self.pages.iter().map(|p| &p.url))
            .chain(self.asset_pages.iter())
            .chain(self.feeds.iter())
            .chain(self.webhook_url.iter());
        for raw in urls {
            url::Url::parse(raw).map_err(|e| {
                AppError::validation(format!("domain '{}': bad URL '{raw}': {e}", self.name))
            })?;
        }

        let repo_re = Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$")
            .map_err(|e| AppError::validation(e.to_string()))?;
        if let Some(bad) = self.repos.iter().find(|r| !repo_re.is_match(r)) {
            return Err(AppError::validation(format!(
                "domain '{}': repository '{bad}' is not owner/name",
                self.name
            )));
        }

        for page in &self.pages {
            if let Some(selector) = &page.selector {
                parse_selector(selector)?;
            }
        }

        Ok(())
    }
}
