//! Per-domain worker and the parallel multi-domain run.
//!
//! One worker owns a domain's whole pipeline: load, fetch, guard, diff,
//! report, dispatch, commit. Steps run strictly in order. Workers share
//! nothing in memory; the snapshot store is the only common resource.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;

use super::batch::Batcher;
use super::circuit_breaker::CircuitBreaker;
use super::commit::StateCommitter;
use super::diff::{DiffEngine, DiffResult};
use super::dispatch::{DispatchReport, Dispatcher};
use super::report::{self, ChangeSummary, ReportSection};
use crate::error::{AppError, Result};
use crate::models::{Config, DomainConfig, ObservationKind, Snapshot};
use crate::services::{Notifier, ObservationSource};
use crate::storage::{Revision, SnapshotStore, StoredSnapshot};

/// What happened to a domain's notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Empty diff; nothing to report
    NothingToSend,
    /// Changes found but no webhook configured for the domain
    NoDestination { messages: usize },
    /// Messages built and logged, not sent
    DryRun { messages: usize },
    /// Messages sent; some may have failed
    Sent(DispatchReport),
}

/// What happened to a domain's next snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitStatus {
    /// Next snapshot equals the stored one
    Unchanged,
    Committed { revision: Revision },
    /// Not persisted; the next run detects the same changes again
    Failed { error: String },
    /// Dry run
    Skipped,
}

/// Result of one domain's successful run (fetch and diff completed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainOutcome {
    pub domain: String,
    /// No snapshot was stored before this run
    pub first_run: bool,
    pub changes: ChangeSummary,
    pub dispatch: DispatchStatus,
    pub commit: CommitStatus,
}

impl DomainOutcome {
    /// Dispatch or commit went wrong.
    pub fn has_warnings(&self) -> bool {
        matches!(self.commit, CommitStatus::Failed { .. })
            || matches!(&self.dispatch, DispatchStatus::Sent(report) if !report.is_complete())
    }
}

/// A domain whose run aborted before or during diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainFailure {
    pub domain: String,
    pub error: String,
}

/// Summary of a multi-domain run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// In configuration order
    pub outcomes: Vec<DomainOutcome>,
    pub failures: Vec<DomainFailure>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// `RunFailed` when any domain failed, after every domain has run.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AppError::RunFailed {
                failed: self.failures.len(),
                total: self.total(),
            })
        }
    }
}

/// Runs the per-domain pipeline against shared collaborators.
#[derive(Clone)]
pub struct Monitor {
    config: Arc<Config>,
    source: Arc<dyn ObservationSource>,
    store: Arc<dyn SnapshotStore>,
    dispatcher: Dispatcher,
    committer: StateCommitter,
    dry_run: bool,
}

impl Monitor {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn ObservationSource>,
        store: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let delay = Duration::from_millis(config.notify.send_delay_ms);
        Self {
            dispatcher: Dispatcher::new(notifier, delay),
            committer: StateCommitter::new(Arc::clone(&store)),
            config,
            source,
            store,
            dry_run: false,
        }
    }

    /// Build and log messages but send and commit nothing.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run every domain in parallel, one task each.
    pub async fn run_all(&self, domains: Vec<DomainConfig>) -> RunSummary {
        let started_at = Utc::now();
        let total = domains.len();
        log::info!("Monitoring {} domains", total);

        let mut tasks = JoinSet::new();
        for (index, domain) in domains.into_iter().enumerate() {
            let monitor = self.clone();
            tasks.spawn(async move {
                let result = AssertUnwindSafe(monitor.run_domain(&domain))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(AppError::validation(format!(
                            "worker for {} panicked",
                            domain.name
                        )))
                    });
                (index, domain.name, result)
            });
        }

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(outcome))) => outcomes.push((index, outcome)),
                Ok((index, domain, Err(e))) => {
                    log::error!("[{}] Run failed: {}", domain, e);
                    failures.push((
                        index,
                        DomainFailure {
                            domain,
                            error: e.to_string(),
                        },
                    ));
                }
                Err(e) => {
                    log::error!("Domain task did not complete: {}", e);
                    failures.push((
                        total,
                        DomainFailure {
                            domain: "(unknown)".to_string(),
                            error: e.to_string(),
                        },
                    ));
                }
            }
        }

        outcomes.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|(index, _)| *index);

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
            failures: failures.into_iter().map(|(_, f)| f).collect(),
        };
        log::info!(
            "Run complete: {} ok, {} failed",
            summary.outcomes.len(),
            summary.failures.len()
        );
        summary
    }

    /// Run one domain's pipeline.
    ///
    /// Fails only when loading, fetching, the guard or the diff fails; in
    /// that case nothing is sent and the stored snapshot is untouched.
    /// Dispatch and commit problems are reported in the outcome instead.
    pub async fn run_domain(&self, domain: &DomainConfig) -> Result<DomainOutcome> {
        let name = domain.name.as_str();

        let stored = self.store.load(name).await?;
        let first_run = stored.snapshot.is_none();

        let fresh = self.source.observe(domain).await.map_err(|e| match e {
            AppError::Fetch { .. } => e,
            other => AppError::fetch(name, other),
        })?;
        log::info!("[{}] Fetched {} observations", name, fresh.len());

        if domain.sitemap_url.is_some() {
            let current = fresh
                .iter()
                .filter(|o| o.kind() == ObservationKind::PageUrl)
                .count();
            let previous = stored.snapshot.as_ref().map_or(0, |s| s.pages.len());
            CircuitBreaker::with_config(self.config.guard.clone()).validate(
                name,
                current,
                previous,
            )?;
        }

        let outcome = DiffEngine::new(self.config.policy).calculate(stored.snapshot.as_ref(), &fresh)?;
        let diff = &outcome.diff;
        log::info!(
            "[{}] {} new pages, {} changed pages, {} changed assets, {} updated repos, {} new feed entries",
            name,
            diff.new_pages.len(),
            diff.changed_pages.len(),
            diff.changed_asset_pages.len(),
            diff.updated_repos.len(),
            diff.new_feed_entries.len()
        );
        if first_run {
            log::info!("[{}] First run; baseline recorded", name);
        }

        let sections = report::assemble(diff);
        let dispatch = self.notify(domain, &sections).await;
        let commit = self.persist(name, &stored, diff, &outcome.next).await;

        Ok(DomainOutcome {
            domain: name.to_string(),
            first_run,
            changes: ChangeSummary::from(diff),
            dispatch,
            commit,
        })
    }

    async fn notify(&self, domain: &DomainConfig, sections: &[ReportSection]) -> DispatchStatus {
        let name = domain.name.as_str();
        if sections.is_empty() {
            return DispatchStatus::NothingToSend;
        }

        let rendered: Vec<String> = sections.iter().map(ReportSection::render).collect();
        let messages =
            Batcher::for_domain(name, self.config.notify.max_message_chars).pack(&rendered);

        if self.dry_run {
            for message in &messages {
                log::info!(
                    "[{}] (dry run) message {}/{}:\n{}",
                    name,
                    message.index + 1,
                    messages.len(),
                    message.text
                );
            }
            return DispatchStatus::DryRun {
                messages: messages.len(),
            };
        }

        let Some(destination) = self.config.destination_for(domain) else {
            log::warn!(
                "[{}] {} messages not sent: no webhook configured",
                name,
                messages.len()
            );
            return DispatchStatus::NoDestination {
                messages: messages.len(),
            };
        };

        let report = self.dispatcher.dispatch(name, destination, &messages).await;
        if report.is_complete() {
            log::info!("[{}] Sent {} messages", name, report.sent);
        } else {
            log::warn!(
                "[{}] Sent {} of {} messages",
                name,
                report.sent,
                messages.len()
            );
        }
        DispatchStatus::Sent(report)
    }

    /// Save `next` when the run changed something: a reported change, a
    /// first run, or keys recorded silently (baselined repos and feeds).
    /// Items merely missing from this run are not saved, so a page that
    /// drops out for one run is not announced again when it returns.
    async fn persist(
        &self,
        name: &str,
        stored: &StoredSnapshot,
        diff: &DiffResult,
        next: &Snapshot,
    ) -> CommitStatus {
        let changed = match &stored.snapshot {
            None => true,
            Some(previous) => diff.has_changes() || next.adds_keys_over(previous),
        };
        if !changed {
            return CommitStatus::Unchanged;
        }
        if self.dry_run {
            return CommitStatus::Skipped;
        }

        match self.committer.commit(name, stored.revision, next).await {
            Ok(revision) => CommitStatus::Committed { revision },
            Err(e) => {
                log::warn!("[{}] Snapshot not saved: {}", name, e);
                CommitStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::models::Observation;
    use crate::storage::LocalStore;

    /// Serves canned observations per domain; unknown domains fail to fetch.
    #[derive(Default)]
    struct FakeSource {
        responses: Mutex<HashMap<String, Vec<Observation>>>,
    }

    impl FakeSource {
        fn set(&self, domain: &str, observations: Vec<Observation>) {
            self.responses
                .lock()
                .unwrap()
                .insert(domain.to_string(), observations);
        }
    }

    #[async_trait]
    impl ObservationSource for FakeSource {
        async fn observe(&self, domain: &DomainConfig) -> Result<Vec<Observation>> {
            if domain.name == "explodes" {
                panic!("fetcher bug");
            }
            self.responses
                .lock()
                .unwrap()
                .get(&domain.name)
                .cloned()
                .ok_or_else(|| AppError::validation("connection refused"))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, destination: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), text.to_string()));
            if self.fail {
                return Err(AppError::dispatch("webhook returned 500"));
            }
            Ok(())
        }
    }

    struct Harness {
        _tmp: TempDir,
        store: Arc<LocalStore>,
        source: Arc<FakeSource>,
        notifier: Arc<RecordingNotifier>,
        monitor: Monitor,
    }

    fn domain(name: &str) -> DomainConfig {
        DomainConfig {
            sitemap_url: Some(format!("https://{name}.org/sitemap.xml")),
            ..DomainConfig::named(name)
        }
    }

    fn harness(notifier: RecordingNotifier) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let source = Arc::new(FakeSource::default());
        let notifier = Arc::new(notifier);

        let mut config = Config::default();
        config.notify.webhook_url = Some("https://hooks.example.com/x".into());
        config.notify.send_delay_ms = 0;

        let monitor = Monitor::new(
            Arc::new(config),
            source.clone(),
            store.clone(),
            notifier.clone(),
        );
        Harness {
            _tmp: tmp,
            store,
            source,
            notifier,
            monitor,
        }
    }

    fn pages(domain: &str, paths: &[&str]) -> Vec<Observation> {
        paths
            .iter()
            .map(|p| Observation::page_url(format!("https://{domain}.org/{p}")))
            .collect()
    }

    #[tokio::test]
    async fn test_first_run_records_baseline_silently() {
        let h = harness(RecordingNotifier::default());
        h.source.set("acme", pages("acme", &["a", "b"]));

        let outcome = h.monitor.run_domain(&domain("acme")).await.unwrap();
        assert!(outcome.first_run);
        assert_eq!(outcome.changes.total(), 0);
        assert_eq!(outcome.dispatch, DispatchStatus::NothingToSend);
        assert_eq!(
            outcome.commit,
            CommitStatus::Committed {
                revision: Revision(1)
            }
        );
        assert!(h.notifier.sent.lock().unwrap().is_empty());

        let stored = h.store.load("acme").await.unwrap().snapshot.unwrap();
        assert_eq!(stored.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_new_page_is_reported_then_quiet() {
        let h = harness(RecordingNotifier::default());
        h.source.set("acme", pages("acme", &["a", "b"]));
        h.monitor.run_domain(&domain("acme")).await.unwrap();

        h.source.set("acme", pages("acme", &["a", "b", "c"]));
        let outcome = h.monitor.run_domain(&domain("acme")).await.unwrap();
        assert!(!outcome.first_run);
        assert_eq!(outcome.changes.new_pages.items, vec!["https://acme.org/c"]);
        assert!(matches!(outcome.dispatch, DispatchStatus::Sent(ref r) if r.sent == 1));
        assert_eq!(
            outcome.commit,
            CommitStatus::Committed {
                revision: Revision(2)
            }
        );

        {
            let sent = h.notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].0, "https://hooks.example.com/x");
            assert!(sent[0].1.starts_with("**Changes detected for acme:**\n"));
            assert!(sent[0].1.contains("**New pages (1):**\nhttps://acme.org/c\n"));
        }

        let again = h.monitor.run_domain(&domain("acme")).await.unwrap();
        assert_eq!(again.dispatch, DispatchStatus::NothingToSend);
        assert_eq!(again.commit, CommitStatus::Unchanged);
    }

    #[tokio::test]
    async fn test_dispatch_failure_still_commits() {
        let h = harness(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        h.source.set("acme", pages("acme", &["a"]));
        h.monitor.run_domain(&domain("acme")).await.unwrap();

        h.source.set("acme", pages("acme", &["a", "b"]));
        let outcome = h.monitor.run_domain(&domain("acme")).await.unwrap();
        assert!(outcome.has_warnings());
        assert!(matches!(outcome.dispatch, DispatchStatus::Sent(ref r) if r.failed.len() == 1));
        assert!(matches!(outcome.commit, CommitStatus::Committed { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_sends_and_commits_nothing() {
        let h = harness(RecordingNotifier::default());
        h.source.set("acme", pages("acme", &["a"]));
        h.monitor.run_domain(&domain("acme")).await.unwrap();

        h.source.set("acme", pages("acme", &["a", "b"]));
        let dry = h.monitor.clone().with_dry_run(true);
        let outcome = dry.run_domain(&domain("acme")).await.unwrap();
        assert_eq!(outcome.dispatch, DispatchStatus::DryRun { messages: 1 });
        assert_eq!(outcome.commit, CommitStatus::Skipped);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert_eq!(h.store.head().await.unwrap(), Revision(1));
    }

    #[tokio::test]
    async fn test_guard_aborts_before_diff() {
        let h = harness(RecordingNotifier::default());
        let many: Vec<String> = (0..20).map(|i| format!("p{i}")).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        h.source.set("acme", pages("acme", &many));
        h.monitor.run_domain(&domain("acme")).await.unwrap();

        h.source.set("acme", pages("acme", &["p0", "p1"]));
        let err = h.monitor.run_domain(&domain("acme")).await.unwrap_err();
        assert!(matches!(err, AppError::CircuitBreakerTriggered { .. }));

        let stored = h.store.load("acme").await.unwrap().snapshot.unwrap();
        assert_eq!(stored.pages.len(), 20);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let h = harness(RecordingNotifier::default());
        h.source.set("acme", pages("acme", &["a"]));
        // "beta" has no canned response and fails to fetch

        let summary = h
            .monitor
            .run_all(vec![domain("beta"), domain("acme"), domain("explodes")])
            .await;

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.outcomes[0].domain, "acme");
        let failed: Vec<_> = summary.failures.iter().map(|f| f.domain.as_str()).collect();
        assert_eq!(failed, vec!["beta", "explodes"]);
        assert!(summary.failures[0].error.contains("Fetch error for beta"));

        assert!(h.store.load("beta").await.unwrap().snapshot.is_none());
        assert!(h.store.load("acme").await.unwrap().snapshot.is_some());
        assert!(matches!(
            summary.into_result().unwrap_err(),
            AppError::RunFailed { failed: 2, total: 3 }
        ));
    }

    #[tokio::test]
    async fn test_page_missing_for_one_run_is_not_saved_or_reannounced() {
        let h = harness(RecordingNotifier::default());
        h.source.set("acme", pages("acme", &["a", "b"]));
        h.monitor.run_domain(&domain("acme")).await.unwrap();

        // "b" drops out of the sitemap for one run
        h.source.set("acme", pages("acme", &["a"]));
        let missing = h.monitor.run_domain(&domain("acme")).await.unwrap();
        assert_eq!(missing.changes.total(), 0);
        assert_eq!(missing.commit, CommitStatus::Unchanged);
        assert_eq!(h.store.head().await.unwrap(), Revision(1));

        // ... and comes back
        h.source.set("acme", pages("acme", &["a", "b"]));
        let back = h.monitor.run_domain(&domain("acme")).await.unwrap();
        assert_eq!(back.changes.total(), 0);
        assert_eq!(back.dispatch, DispatchStatus::NothingToSend);
        assert_eq!(back.commit, CommitStatus::Unchanged);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_silently_baselined_repo_is_saved() {
        let h = harness(RecordingNotifier::default());
        h.source.set("acme", pages("acme", &["a"]));
        h.monitor.run_domain(&domain("acme")).await.unwrap();

        let mut observations = pages("acme", &["a"]);
        observations.push(Observation::repo_state("acme/site", "abc123"));
        h.source.set("acme", observations);

        let outcome = h.monitor.run_domain(&domain("acme")).await.unwrap();
        assert_eq!(outcome.changes.total(), 0);
        assert_eq!(
            outcome.commit,
            CommitStatus::Committed {
                revision: Revision(2)
            }
        );
        let stored = h.store.load("acme").await.unwrap().snapshot.unwrap();
        assert_eq!(stored.repos.get("acme/site").map(String::as_str), Some("abc123"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_domains_all_persist() {
        let h = harness(RecordingNotifier::default());
        let names: Vec<String> = (0..8).map(|i| format!("site{i}")).collect();
        for name in &names {
            h.source.set(name, pages(name, &["index"]));
        }

        let summary = h
            .monitor
            .run_all(names.iter().map(|n| domain(n)).collect())
            .await;
        assert!(summary.is_success());
        assert_eq!(summary.outcomes.len(), names.len());

        for outcome in &summary.outcomes {
            assert!(
                matches!(outcome.commit, CommitStatus::Committed { .. }),
                "{} not saved: {:?}",
                outcome.domain,
                outcome.commit
            );
        }
        assert_eq!(h.store.head().await.unwrap(), Revision(names.len() as u64));
        for name in &names {
            assert!(h.store.load(name).await.unwrap().snapshot.is_some());
        }
    }
}
