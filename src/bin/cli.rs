//! sitewatch CLI
//!
//! Runs the change monitor for configured domains, validates configuration
//! and shows what the snapshot store currently holds.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sitewatch::{
    config::{DEFAULT_CONFIG_PATH, load_config, load_validated},
    error::{AppError, Result},
    models::{Config, DomainConfig},
    pipeline::{CommitStatus, DispatchStatus, Monitor, RunSummary},
    services::{HttpFetcher, WebhookNotifier},
    storage::LocalStore,
};

/// sitewatch - web presence change monitor
#[derive(Parser, Debug)]
#[command(
    name = "sitewatch",
    version,
    about = "Watches sites, repositories and feeds for changes"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check domains for changes, notify and save snapshots
    Run {
        /// Only run these domains (repeatable; default: all)
        #[arg(short, long = "domain")]
        domains: Vec<String>,

        /// Build messages and log them without sending or saving anything
        #[arg(long)]
        dry_run: bool,

        /// Write the run summary as JSON to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,

    /// Show stored snapshot info
    Info {
        /// Only show these domains (repeatable; default: all)
        #[arg(short, long = "domain")]
        domains: Vec<String>,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Resolve `--domain` arguments against the configuration.
fn select_domains(config: &Config, names: &[String]) -> Result<Vec<DomainConfig>> {
    if names.is_empty() {
        return Ok(config.domains.clone());
    }
    names
        .iter()
        .map(|name| {
            config
                .domain(name)
                .cloned()
                .ok_or_else(|| AppError::config(format!("Unknown domain '{name}'")))
        })
        .collect()
}

fn log_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        let dispatch = match &outcome.dispatch {
            DispatchStatus::NothingToSend => "nothing to send".to_string(),
            DispatchStatus::NoDestination { messages } => {
                format!("{messages} messages, no webhook")
            }
            DispatchStatus::DryRun { messages } => format!("{messages} messages (dry run)"),
            DispatchStatus::Sent(report) => {
                format!("{} sent, {} failed", report.sent, report.failed.len())
            }
        };
        let commit = match &outcome.commit {
            CommitStatus::Unchanged => "unchanged".to_string(),
            CommitStatus::Committed { revision } => format!("saved at {revision}"),
            CommitStatus::Failed { error } => format!("NOT saved ({error})"),
            CommitStatus::Skipped => "not saved (dry run)".to_string(),
        };
        let line = format!(
            "[{}] {} changes; {}; snapshot {}",
            outcome.domain,
            outcome.changes.total(),
            dispatch,
            commit
        );
        if outcome.has_warnings() {
            log::warn!("{}", line);
        } else {
            log::info!("{}", line);
        }
    }

    for failure in &summary.failures {
        log::error!("[{}] FAILED: {}", failure.domain, failure.error);
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            domains,
            dry_run,
            summary,
        } => {
            let config = load_validated(&cli.config)?;
            log::info!("Loaded configuration from {}", cli.config.display());
            let selected = select_domains(&config, &domains)?;

            let config = Arc::new(config);
            let source = Arc::new(HttpFetcher::new(&config.monitor)?);
            let store = Arc::new(LocalStore::new(&config.storage.state_dir));
            let notifier = Arc::new(WebhookNotifier::new(&config.notify)?);

            let monitor =
                Monitor::new(Arc::clone(&config), source, store, notifier).with_dry_run(dry_run);
            let run = monitor.run_all(selected).await;
            log_summary(&run);

            if let Some(path) = summary {
                std::fs::write(&path, serde_json::to_string_pretty(&run)?)?;
                log::info!("Run summary written to {}", path.display());
            }

            run.into_result()?;
        }

        Command::Validate => {
            log::info!("Validating {}...", cli.config.display());

            let config = match load_validated(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("Config validation failed: {}", e);
                    return Err(e);
                }
            };
            log::info!("✓ Config OK ({} domains)", config.domains.len());
            for domain in &config.domains {
                let destination = if config.destination_for(domain).is_some() {
                    "webhook set"
                } else {
                    "no webhook"
                };
                log::info!(
                    "  {}: sitemap {}, {} pages, {} asset pages, {} repos, {} feeds, {}",
                    domain.name,
                    if domain.sitemap_url.is_some() { "yes" } else { "no" },
                    domain.pages.len(),
                    domain.asset_pages.len(),
                    domain.repos.len(),
                    domain.feeds.len(),
                    destination
                );
            }
        }

        Command::Info { domains } => {
            let config = load_config(&cli.config);
            let selected = select_domains(&config, &domains)?;
            let store = LocalStore::new(&config.storage.state_dir);

            log::info!("State directory: {}", store.root().display());
            log::info!("Store revision: {}", store.head().await?);

            for domain in &selected {
                match store.record(&domain.name).await? {
                    Some(record) => {
                        let snapshot = &record.snapshot;
                        log::info!(
                            "[{}] saved at {} ({}): {} pages, {} hashed pages, {} asset pages, {} repos, {} feed entries",
                            domain.name,
                            record.revision,
                            record.updated_at.to_rfc3339(),
                            snapshot.pages.len(),
                            snapshot.page_hashes.len(),
                            snapshot.asset_hashes.len(),
                            snapshot.repos.len(),
                            snapshot.feed_entry_count()
                        );
                    }
                    None => log::info!("[{}] No snapshot yet.", domain.name),
                }
            }
        }
    }

    Ok(())
}
