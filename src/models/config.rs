//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::DomainConfig;

/// Environment variable overriding `notify.webhook_url`.
pub const WEBHOOK_URL_ENV: &str = "SITEWATCH_WEBHOOK_URL";

/// Environment variable supplying `monitor.github_token`.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and fetching behavior settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Notification delivery settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// First-sight reporting policy
    #[serde(default)]
    pub policy: DiffPolicy,

    /// Page-count drop protection
    #[serde(default)]
    pub guard: GuardConfig,

    /// Snapshot store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Monitored domains
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply environment overrides for secrets that do not belong in the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(WEBHOOK_URL_ENV) {
            if !url.trim().is_empty() {
                self.notify.webhook_url = Some(url.trim().to_string());
            }
        }
        if let Ok(token) = std::env::var(GITHUB_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.monitor.github_token = Some(token.trim().to_string());
            }
        }
    }

    /// Find a domain by name.
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Webhook destination for a domain: its own override, then the global one.
    pub fn destination_for<'a>(&'a self, domain: &'a DomainConfig) -> Option<&'a str> {
        domain
            .webhook_url
            .as_deref()
            .or(self.notify.webhook_url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.user_agent.trim().is_empty() {
            return Err(AppError::validation("monitor.user_agent is empty"));
        }
        if self.monitor.timeout_secs == 0 {
            return Err(AppError::validation("monitor.timeout_secs must be > 0"));
        }
        if self.monitor.max_concurrent == 0 {
            return Err(AppError::validation("monitor.max_concurrent must be > 0"));
        }
        if !(MIN_MESSAGE_CHARS..=MAX_MESSAGE_CHARS).contains(&self.notify.max_message_chars) {
            return Err(AppError::validation(format!(
                "notify.max_message_chars must be within {MIN_MESSAGE_CHARS}..={MAX_MESSAGE_CHARS}"
            )));
        }
        if self.guard.max_drop_percent > 100 {
            return Err(AppError::validation("guard.max_drop_percent must be <= 100"));
        }
        if self.storage.state_dir.trim().is_empty() {
            return Err(AppError::validation("storage.state_dir is empty"));
        }
        if let Some(url) = &self.notify.webhook_url {
            url::Url::parse(url)
                .map_err(|e| AppError::validation(format!("notify.webhook_url: {e}")))?;
        }
        if self.domains.is_empty() {
            return Err(AppError::validation("No domains defined"));
        }

        let mut names = HashSet::new();
        for domain in &self.domains {
            if !names.insert(domain.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate domain name '{}'",
                    domain.name
                )));
            }
            domain.validate()?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            notify: NotifyConfig::default(),
            policy: DiffPolicy::default(),
            guard: GuardConfig::default(),
            storage: StorageConfig::default(),
            domains: Vec::new(),
        }
    }
}

/// Smallest accepted message limit; leaves room for headers and the truncation marker.
pub const MIN_MESSAGE_CHARS: usize = 100;

/// Transport ceiling for a single message.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// HTTP client and fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent requests within one domain
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum sitemap index nesting followed
    #[serde(default = "defaults::max_sitemap_depth")]
    pub max_sitemap_depth: usize,

    /// Base URL of the GitHub REST API
    #[serde(default = "defaults::github_api_url")]
    pub github_api_url: String,

    /// Token for the GitHub API (usually from `GITHUB_TOKEN`)
    #[serde(default, skip_serializing)]
    pub github_token: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            max_sitemap_depth: defaults::max_sitemap_depth(),
            github_api_url: defaults::github_api_url(),
            github_token: None,
        }
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Default webhook endpoint; domains without one and without this are not notified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Maximum characters per message
    #[serde(default = "defaults::max_message_chars")]
    pub max_message_chars: usize,

    /// Pause between consecutive messages in milliseconds
    #[serde(default = "defaults::send_delay")]
    pub send_delay_ms: u64,

    /// Webhook request timeout in seconds
    #[serde(default = "defaults::notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_message_chars: defaults::max_message_chars(),
            send_delay_ms: defaults::send_delay(),
            timeout_secs: defaults::notify_timeout(),
        }
    }
}

/// Whether first sightings are recorded silently or reported as changes.
///
/// `true` means "record the baseline, report nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPolicy {
    /// First run for a domain (no stored snapshot)
    #[serde(default = "defaults::enabled")]
    pub baseline_new_domains: bool,

    /// Repository observed for the first time
    #[serde(default = "defaults::enabled")]
    pub baseline_new_repos: bool,

    /// Feed URL observed for the first time
    #[serde(default = "defaults::enabled")]
    pub baseline_new_feeds: bool,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            baseline_new_domains: true,
            baseline_new_repos: true,
            baseline_new_feeds: true,
        }
    }
}

impl DiffPolicy {
    /// Report everything, including first sightings.
    pub fn report_all() -> Self {
        Self {
            baseline_new_domains: false,
            baseline_new_repos: false,
            baseline_new_feeds: false,
        }
    }
}

/// Page-count drop protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Maximum allowed drop percentage (0-100)
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Below this previous page count the drop check is skipped
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
        }
    }
}

/// Snapshot store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::state_dir")]
    pub state_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: defaults::state_dir(),
        }
    }
}

mod defaults {
    // Monitor defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; sitewatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        45
    }
    pub fn request_delay() -> u64 {
        250
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_sitemap_depth() -> usize {
        3
    }
    pub fn github_api_url() -> String {
        "https://api.github.com".into()
    }

    // Notify defaults
    pub fn max_message_chars() -> usize {
        1950
    }
    pub fn send_delay() -> u64 {
        1000
    }
    pub fn notify_timeout() -> u64 {
        10
    }

    // Guard defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn max_drop_percent() -> u8 {
        50
    }
    pub fn min_baseline() -> usize {
        10
    }

    // Storage defaults
    pub fn state_dir() -> String {
        "state".into()
    }
}
