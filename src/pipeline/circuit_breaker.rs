//! Circuit Breaker for sitemap page counts.
//!
//! A snapshot is replaced wholesale on every run, so a sitemap that comes
//! back empty or badly truncated would silently drop most known pages and
//! re-announce them all once the sitemap recovers. The breaker aborts the
//! domain's run before diffing when the page count collapses.

use crate::error::{AppError, Result};
use crate::models::GuardConfig;

/// Circuit breaker for page-count drops.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: GuardConfig,
}

/// Result of circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to proceed
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// Previous count below baseline, or no previous data
    ColdStart { current_count: usize },
    /// Drop exceeds the threshold
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// No pages at all while there used to be some
    EmptyResult { previous_count: usize },
    /// Breaker switched off
    Disabled,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Compare the fresh page count against the previous one.
    pub fn check(&self, current_count: usize, previous_count: usize) -> CircuitBreakerResult {
        if !self.config.enabled {
            return CircuitBreakerResult::Disabled;
        }

        if current_count == 0 && previous_count > 0 {
            return CircuitBreakerResult::EmptyResult { previous_count };
        }

        if previous_count < self.config.min_baseline.max(1) {
            return CircuitBreakerResult::ColdStart { current_count };
        }

        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;

            if drop_percent > self.config.max_drop_percent as f64 {
                return CircuitBreakerResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        CircuitBreakerResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Validate and return Ok if safe, Err if circuit breaker triggered.
    pub fn validate(&self, domain: &str, current_count: usize, previous_count: usize) -> Result<()> {
        match self.check(current_count, previous_count) {
            CircuitBreakerResult::Safe { .. }
            | CircuitBreakerResult::ColdStart { .. }
            | CircuitBreakerResult::Disabled => Ok(()),
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "[{}] Circuit breaker: TRIGGERED! {} → {} pages ({:.1}% drop > {}% threshold)",
                    domain,
                    previous_count,
                    current_count,
                    drop_percent,
                    self.config.max_drop_percent
                );
                Err(AppError::CircuitBreakerTriggered {
                    current_count,
                    previous_count,
                    drop_percent,
                    threshold_percent: self.config.max_drop_percent,
                })
            }
            CircuitBreakerResult::EmptyResult { previous_count } => {
                log::error!("[{}] Circuit breaker: EMPTY SITEMAP - aborting run", domain);
                Err(AppError::EmptySitemap { previous_count })
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
