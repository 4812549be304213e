// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains the data structures shared by the fetchers, the
//! change-detection pipeline and the snapshot store.

mod config;
mod domain;
mod observation;
mod snapshot;

// Re-export all public types
pub use config::{
    Config, DiffPolicy, GITHUB_TOKEN_ENV, GuardConfig, MAX_MESSAGE_CHARS, MIN_MESSAGE_CHARS,
    MonitorConfig, NotifyConfig, StorageConfig, WEBHOOK_URL_ENV,
};
pub use domain::{DomainConfig, PageSelector};
pub use observation::{Observation, ObservationKind};
pub use snapshot::Snapshot;
