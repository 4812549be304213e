//! HTTP observation source.
//!
//! Fetches every target configured for a domain: sitemap pages, hashed page
//! content, page assets, repository heads and feed entries. Any failing
//! target fails the whole fetch.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use reqwest::Client;

use super::ObservationSource;
use super::feeds::observe_feed;
use super::pages::{observe_assets, observe_page};
use super::repos::observe_repo;
use super::sitemap::collect_page_urls;
use crate::error::Result;
use crate::models::{DomainConfig, MonitorConfig, Observation};
use crate::utils::http::create_async_client;

/// Observation source backed by live HTTP requests.
pub struct HttpFetcher {
    config: MonitorConfig,
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            config: config.clone(),
        })
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.config.request_delay_ms)
    }

    fn concurrency(&self) -> usize {
        self.config.max_concurrent.max(1)
    }

    /// Await `fetches` with bounded concurrency, keeping input order.
    async fn gather<R>(&self, fetches: Vec<BoxFuture<'_, Result<R>>>) -> Result<Vec<R>> {
        let delay = self.delay();
        let mut results = Vec::with_capacity(fetches.len());
        let mut stream = stream::iter(fetches).buffered(self.concurrency());

        while let Some(result) = stream.next().await {
            results.push(result?);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl ObservationSource for HttpFetcher {
    async fn observe(&self, domain: &DomainConfig) -> Result<Vec<Observation>> {
        let name = domain.name.as_str();
        let client = &self.client;
        let mut observations = Vec::new();

        if let Some(sitemap_url) = &domain.sitemap_url {
            let pages = collect_page_urls(
                client,
                name,
                sitemap_url,
                self.config.max_sitemap_depth,
                self.delay(),
            )
            .await?;
            log::info!("[{}] Sitemap lists {} pages", name, pages.len());
            observations.extend(pages.into_iter().map(Observation::page_url));
        }

        let fetches: Vec<BoxFuture<'_, Result<Observation>>> = domain
            .pages
            .iter()
            .map(|page| observe_page(client, name, page).boxed())
            .collect();
        observations.extend(self.gather(fetches).await?);

        let concurrency = self.concurrency();
        let fetches: Vec<BoxFuture<'_, Result<Observation>>> = domain
            .asset_pages
            .iter()
            .map(|page_url| observe_assets(client, name, page_url, concurrency).boxed())
            .collect();
        observations.extend(self.gather(fetches).await?);

        let api_base = self.config.github_api_url.as_str();
        let token = self.config.github_token.as_deref();
        let fetches: Vec<BoxFuture<'_, Result<Observation>>> = domain
            .repos
            .iter()
            .map(|repo| observe_repo(client, api_base, token, repo).boxed())
            .collect();
        observations.extend(self.gather(fetches).await?);

        let fetches: Vec<BoxFuture<'_, Result<Vec<Observation>>>> = domain
            .feeds
            .iter()
            .map(|feed_url| observe_feed(client, name, feed_url).boxed())
            .collect();
        let feeds = self.gather(fetches).await?;
        observations.extend(feeds.into_iter().flatten());

        log::debug!("[{}] {} observations fetched", name, observations.len());
        Ok(observations)
    }
}
