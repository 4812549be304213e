//! Utility functions and helpers.

pub mod http;

use scraper::Selector;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{AppError, Result};

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// SHA-256 of the given bytes as lowercase hex.
pub fn content_hash(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

/// Parse a CSS selector, mapping the parser's error into ours.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Unwrap CDATA sections so the HTML parser keeps their text.
pub fn strip_cdata(xml: &str) -> String {
    xml.replace("<![CDATA[", "").replace("]]>", "")
}
