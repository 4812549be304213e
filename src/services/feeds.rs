//! RSS and Atom entry extraction.
//!
//! Feeds are parsed with the HTML parser. Two quirks follow from that: RSS
//! `<link>` is a void element there, so its URL is the text node right after
//! it, and CDATA sections must be unwrapped before parsing.

use std::collections::HashSet;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::Result;
use crate::models::Observation;
use crate::utils::http::fetch_text;
use crate::utils::{parse_selector, strip_cdata};

/// One entry as it appears in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItemEntry {
    pub id: String,
    pub title: String,
    pub link: String,
}

/// Entries of an RSS or Atom document in document order.
///
/// Identity is `guid` / `id`, then the link, then the title. Entries with
/// none of these are skipped, as are repeats of an identity already seen.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItemEntry>> {
    let document = Html::parse_document(&strip_cdata(xml));
    let entry_sel = parse_selector("item, entry")?;
    let id_sel = parse_selector("guid, id")?;
    let title_sel = parse_selector("title")?;
    let link_sel = parse_selector("link")?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for entry in document.select(&entry_sel) {
        let title = first_text(entry, &title_sel);
        let link = entry_link(entry, &link_sel);
        let id = first_text(entry, &id_sel)
            .or_else(|| link.clone())
            .or_else(|| title.clone());

        let Some(id) = id else {
            log::debug!("Skipping feed entry without id, link or title");
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }

        entries.push(FeedItemEntry {
            link: link.unwrap_or_else(|| id.clone()),
            title: title.unwrap_or_else(|| "(untitled)".to_string()),
            id,
        });
    }

    Ok(entries)
}

fn first_text(entry: ElementRef<'_>, selector: &Selector) -> Option<String> {
    entry
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

/// Atom `<link href>` (alternate or unqualified), else RSS `<link>` text.
fn entry_link(entry: ElementRef<'_>, selector: &Selector) -> Option<String> {
    for link in entry.select(selector) {
        if let Some(href) = link.value().attr("href") {
            let rel = link.value().attr("rel").unwrap_or("alternate");
            if rel == "alternate" && !href.trim().is_empty() {
                return Some(href.trim().to_string());
            }
            continue;
        }

        let text = link
            .next_sibling()
            .and_then(|node| node.value().as_text().map(|t| t.trim().to_string()))
            .filter(|t| !t.is_empty());
        if text.is_some() {
            return text;
        }
    }
    None
}

/// Fetch a feed and observe each of its entries.
pub async fn observe_feed(client: &Client, domain: &str, feed_url: &str) -> Result<Vec<Observation>> {
    let xml = fetch_text(client, feed_url).await?;
    let entries = parse_feed(&xml)?;
    log::debug!("[{}] {} entries in {}", domain, entries.len(), feed_url);

    Ok(entries
        .into_iter()
        .map(|entry| Observation::feed_entry(feed_url, entry.id, entry.title, entry.link))
        .collect())
}
