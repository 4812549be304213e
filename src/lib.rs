// src/lib.rs

//! sitewatch library: change monitoring for organizations' web presences.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
