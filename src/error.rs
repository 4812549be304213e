// src/error.rs

//! Unified error handling for the watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Observation fetch failed; the domain's run is aborted before diffing
    #[error("Fetch error for {domain}: {message}")]
    Fetch { domain: String, message: String },

    /// Malformed observation batch (e.g. duplicate identity key)
    #[error("Inconsistent observations: duplicate {kind} key '{key}'")]
    DiffInconsistency { kind: String, key: String },

    /// A single notification message could not be delivered
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// The shared store moved underneath a commit and the rebase did not resolve it
    #[error("Commit conflict for {domain}: {message}")]
    CommitConflict { domain: String, message: String },

    /// Page count dropped too far compared to the previous snapshot
    #[error(
        "Circuit breaker triggered: {previous_count} -> {current_count} pages ({drop_percent:.1}% drop > {threshold_percent}%)"
    )]
    CircuitBreakerTriggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
        threshold_percent: u8,
    },

    /// Sitemap returned no pages while the previous snapshot had some
    #[error("Sitemap returned no pages (previously {previous_count})")]
    EmptySitemap { previous_count: usize },

    /// At least one domain failed during a multi-domain run
    #[error("{failed} of {total} domains failed")]
    RunFailed { failed: usize, total: usize },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a domain.
    pub fn fetch(domain: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            domain: domain.into(),
            message: message.to_string(),
        }
    }

    /// Create a dispatch error.
    pub fn dispatch(message: impl fmt::Display) -> Self {
        Self::Dispatch(message.to_string())
    }

    /// Create a commit conflict for a domain.
    pub fn commit_conflict(domain: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::CommitConflict {
            domain: domain.into(),
            message: message.to_string(),
        }
    }
}
