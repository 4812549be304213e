//! Service layer: where observations come from and where reports go.
//!
//! The pipeline only sees the two traits below:
//! - `ObservationSource` produces a domain's fresh observations
//!   (`HttpFetcher` fetches sitemaps, pages, assets, repositories and feeds)
//! - `Notifier` delivers one message to a destination (`WebhookNotifier`)

pub mod feeds;
mod fetcher;
pub mod pages;
pub mod repos;
pub mod sitemap;
mod webhook;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DomainConfig, Observation};

pub use fetcher::HttpFetcher;
pub use webhook::WebhookNotifier;

/// Produces the fresh observation set for a domain.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Fetch everything configured for `domain`. A partial result is never
    /// returned: any failing target fails the whole call.
    async fn observe(&self, domain: &DomainConfig) -> Result<Vec<Observation>>;
}

/// Generic "send one text message" transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<()>;
}
