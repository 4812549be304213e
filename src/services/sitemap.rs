//! Sitemap and sitemap-index fetching.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};

use crate::error::Result;
use crate::utils::http::fetch_text;
use crate::utils::{parse_selector, strip_cdata};

/// What a fetched sitemap document turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of further sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
}

/// Parse a sitemap. Any `<sitemap><loc>` makes it an index.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let document = Html::parse_document(&strip_cdata(xml));
    let sitemap_sel = parse_selector("sitemap > loc")?;
    let url_sel = parse_selector("url > loc")?;

    let locs = |sel: &Selector| -> Vec<String> {
        document
            .select(sel)
            .map(|loc| loc.text().collect::<String>().trim().to_string())
            .filter(|loc| !loc.is_empty())
            .collect()
    };

    let children = locs(&sitemap_sel);
    if !children.is_empty() {
        return Ok(SitemapDocument::Index(children));
    }
    Ok(SitemapDocument::UrlSet(locs(&url_sel)))
}

/// Collect page URLs reachable from `root`, following sitemap indexes up to
/// `max_depth` levels. Deduplicated, first-seen order.
pub async fn collect_page_urls(
    client: &Client,
    domain: &str,
    root: &str,
    max_depth: usize,
    delay: Duration,
) -> Result<Vec<String>> {
    let mut pending = VecDeque::from([(root.to_string(), 0usize)]);
    let mut visited = HashSet::new();
    let mut seen = HashSet::new();
    let mut pages = Vec::new();

    while let Some((url, depth)) = pending.pop_front() {
        if !visited.insert(url.clone()) {
            continue;
        }

        let body = fetch_text(client, &url).await?;
        match parse_sitemap(&body)? {
            SitemapDocument::Index(children) => {
                log::debug!(
                    "[{}] Sitemap index {} lists {} sitemaps",
                    domain,
                    url,
                    children.len()
                );
                if depth >= max_depth {
                    log::warn!(
                        "[{}] Not following {} nested sitemaps in {}: depth limit {} reached",
                        domain,
                        children.len(),
                        url,
                        max_depth
                    );
                } else {
                    pending.extend(children.into_iter().map(|child| (child, depth + 1)));
                }
            }
            SitemapDocument::UrlSet(urls) => {
                log::debug!("[{}] Sitemap {} lists {} pages", domain, url, urls.len());
                for page in urls {
                    if seen.insert(page.clone()) {
                        pages.push(page);
                    }
                }
            }
        }

        if !pending.is_empty() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(pages)
}
