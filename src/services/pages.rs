//! Page content and asset hashing.

use std::collections::HashSet;

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::Result;
use crate::models::{Observation, PageSelector};
use crate::utils::http::fetch_text;
use crate::utils::{content_hash, parse_selector, resolve_url};

/// Elements whose referenced resources count as a page's assets.
const ASSET_SELECTORS: [(&str, &str); 3] = [
    ("script[src]", "src"),
    ("link[rel~=stylesheet][href]", "href"),
    ("img[src]", "src"),
];

/// Hash of the fragments matching `selector` (inner HTML, newline-joined),
/// or of the whole body without one. `None` when the selector matches nothing.
pub fn hash_page(html: &str, selector: Option<&Selector>) -> Option<String> {
    let Some(selector) = selector else {
        return Some(content_hash(html));
    };

    let document = Html::parse_document(html);
    let fragments: Vec<String> = document.select(selector).map(|el| el.inner_html()).collect();
    if fragments.is_empty() {
        return None;
    }
    Some(content_hash(fragments.join("\n")))
}

/// Absolute URLs of a page's scripts, stylesheets and images, deduplicated
/// in document order per element kind.
pub fn asset_urls(html: &str, base: &Url) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for (css, attr) in ASSET_SELECTORS {
        let selector = parse_selector(css)?;
        for element in document.select(&selector) {
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let resolved = resolve_url(base, raw);
            if seen.insert(resolved.clone()) {
                urls.push(resolved);
            }
        }
    }

    Ok(urls)
}

/// Fetch a page and observe its content hash.
pub async fn observe_page(client: &Client, domain: &str, page: &PageSelector) -> Result<Observation> {
    let html = fetch_text(client, &page.url).await?;
    let selector = page.selector.as_deref().map(parse_selector).transpose()?;

    let hash = hash_page(&html, selector.as_ref()).unwrap_or_else(|| {
        log::warn!(
            "[{}] Selector '{}' matched nothing on {}",
            domain,
            page.selector.as_deref().unwrap_or_default(),
            page.url
        );
        content_hash("")
    });

    Ok(Observation::page_content(&page.url, hash))
}

/// Fetch a page, then each of its assets, and observe the set of asset hashes.
pub async fn observe_assets(
    client: &Client,
    domain: &str,
    page_url: &str,
    concurrency: usize,
) -> Result<Observation> {
    let base = Url::parse(page_url)?;
    let html = fetch_text(client, page_url).await?;
    let urls = asset_urls(&html, &base)?;
    log::debug!("[{}] {} assets on {}", domain, urls.len(), page_url);

    let hashes: Vec<String> = stream::iter(urls)
        .map(|url| async move { hash_asset(client, domain, &url).await })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(Observation::asset_set(page_url, hashes))
}

/// Hash one asset. Inline `data:` URLs hash their own text; a 4xx response
/// yields a stable marker so a removed asset registers as a change.
async fn hash_asset(client: &Client, domain: &str, url: &str) -> Result<String> {
    if url.starts_with("data:") {
        return Ok(content_hash(url));
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if status.is_client_error() {
        log::warn!("[{}] Asset {} returned {}", domain, url, status);
        return Ok(format!("missing:{}:{}", status.as_u16(), url));
    }

    let bytes = response.error_for_status()?.bytes().await?;
    Ok(content_hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
<script src="/js/app.js"></script>
<link rel="stylesheet" href="css/site.css">
<link rel="icon" href="/favicon.ico">
</head><body>
<main><h1>Pricing</h1><p>Pro: $10</p></main>
<img src="https://cdn.a.org/logo.png"><img src="/js/app.js"><img src="">
<footer>Generated at 12:00</footer>
</body></html>"#;

    #[test]
    fn test_hash_whole_body() {
        assert_eq!(hash_page(PAGE, None), Some(content_hash(PAGE)));
    }

    #[test]
    fn test_hash_ignores_content_outside_selector() {
        let selector = parse_selector("main").unwrap();
        let before = hash_page(PAGE, Some(&selector)).unwrap();
        let after = hash_page(&PAGE.replace("12:00", "13:00"), Some(&selector)).unwrap();
        assert_eq!(before, after);

        let changed = hash_page(&PAGE.replace("$10", "$12"), Some(&selector)).unwrap();
        assert_ne!(before, changed);
    }

    #[test]
    fn test_selector_without_match() {
        let selector = parse_selector("#missing").unwrap();
        assert!(hash_page(PAGE, Some(&selector)).is_none());
    }

    #[test]
    fn test_asset_urls() {
        let base = Url::parse("https://a.org/pricing/").unwrap();
        let urls = asset_urls(PAGE, &base).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://a.org/js/app.js",
                "https://a.org/pricing/css/site.css",
                "https://cdn.a.org/logo.png",
            ]
        );
    }
}
