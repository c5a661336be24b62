use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, warn};

use crate::action::ActionFactory;
use crate::autoplan::AutoPlanElector;
use crate::client::{self, GitHubClient};
use crate::detector::should_process;
use crate::dispatch::execute_action;
use crate::health::Health;
use crate::notifier::{diff_events, Notifier};
use crate::retry::execute;
use crate::transition::transition;
use crate::types::{AutoMergeMetrics, EventType, HealthReport, Issue, Mergeable, OrbitEvent, PrState, LABEL_LGTM};

pub struct IssueWatcherConfig {
    pub owner: String,
    pub repo: String,
    pub labels: Vec<String>,
    pub poll_interval: Duration,
    pub auto_merge_lgtm: bool,
    pub auto_plan_issue: bool,
}

/// Periodic poller for issues. Owns its health counters, last-observed
/// label map, and auto-merge metrics behind locks; the GitHub client,
/// action factory, and notifier are shared collaborators it does not own.
pub struct IssueWatcher {
    config: IssueWatcherConfig,
    client: Arc<dyn GitHubClient>,
    factory: Arc<dyn ActionFactory>,
    notifier: Option<Arc<Notifier>>,
    health: Health,
    elector: AutoPlanElector,
    last_labels: Mutex<HashMap<u64, Vec<String>>>,
    merge_metrics: Mutex<AutoMergeMetrics>,
}

impl IssueWatcher {
    pub fn new(
        config: IssueWatcherConfig,
        client: Arc<dyn GitHubClient>,
        factory: Arc<dyn ActionFactory>,
        notifier: Option<Arc<Notifier>>,
    ) -> Result<Arc<Self>> {
        if config.owner.is_empty() {
            bail!("issue watcher: owner must not be empty");
        }
        if config.repo.is_empty() {
            bail!("issue watcher: repo must not be empty");
        }
        if config.labels.is_empty() {
            bail!("issue watcher: labels must not be empty");
        }
        if config.poll_interval < Duration::from_secs(1) {
            bail!("issue watcher: poll_interval must be >= 1s");
        }
        Ok(Arc::new(Self {
            config,
            client,
            factory,
            notifier,
            health: Health::new(),
            elector: AutoPlanElector::new(),
            last_labels: Mutex::new(HashMap::new()),
            merge_metrics: Mutex::new(AutoMergeMetrics::default()),
        }))
    }

    pub async fn health_report(&self, max_inactivity: Duration) -> HealthReport {
        self.health.check_health(max_inactivity, Utc::now()).await
    }

    pub async fn merge_metrics(&self) -> AutoMergeMetrics {
        self.merge_metrics.lock().await.clone()
    }

    pub async fn auto_plan_last_election(&self) -> Option<chrono::DateTime<Utc>> {
        self.elector.last_election().await
    }

    /// Drives the ticker loop until `shutdown` is signalled. Each cycle runs
    /// in its own spawned task so a panic inside it is caught via the
    /// `JoinHandle` rather than unwinding the loop itself.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let watcher = self.clone();
            let handle = tokio::spawn(async move { watcher.tick().await });
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "issue watcher: cycle returned an error"),
                Err(join_err) => error!(error = %join_err, "issue watcher: cycle panicked"),
            }
        }
    }

    /// One poll cycle: list, then for each issue detect/dispatch/transition,
    /// then auto-merge and label-diff bookkeeping, then the auto-plan probe.
    pub async fn tick(self: &Arc<Self>) -> Result<()> {
        self.health.record_start(Utc::now()).await;

        let retry_base = if self.config.poll_interval < Duration::from_secs(1) {
            Duration::from_millis(100)
        } else {
            Duration::from_secs(1)
        };

        let issues = match execute(
            3,
            retry_base,
            |_attempt| self.client.list_issues_by_labels(&self.config.owner, &self.config.repo, &self.config.labels),
            client::classify,
        )
        .await
        {
            Ok(issues) => issues,
            Err(err) => {
                self.health.record_failure().await;
                warn!(error = %err, "issue watcher: list_issues_by_labels failed, retrying next tick");
                return Ok(());
            }
        };

        for issue in &issues {
            let watcher = self.clone();
            let issue = issue.clone();
            let handle = tokio::spawn(async move { watcher.process_issue(&issue).await });
            if let Err(join_err) = handle.await {
                error!(error = %join_err, "issue watcher: per-issue callback panicked");
            }
        }

        if let Err(err) = self
            .elector
            .maybe_elect(self.client.as_ref(), &self.config.owner, &self.config.repo, self.config.auto_plan_issue)
            .await
        {
            warn!(error = %err, "issue watcher: auto-plan election failed");
        }

        self.health.record_success().await;
        Ok(())
    }

    async fn process_issue(self: &Arc<Self>, issue: &Issue) {
        let (eligible, reason) = should_process(issue);
        debug!(issue = issue.number, eligible, reason = %reason, "issue watcher: decision");

        if eligible {
            if let Some(notifier) = &self.notifier {
                notifier
                    .send(OrbitEvent {
                        kind: EventType::IssueDetected,
                        issue_id: issue.number,
                        issue_title: issue.title.clone(),
                        owner: self.config.owner.clone(),
                        repo: self.config.repo.clone(),
                        from_label: None,
                        to_label: None,
                        timestamp: Utc::now(),
                    })
                    .await;
            }

            if let Err(err) = execute_action(self.factory.as_ref(), issue).await {
                warn!(issue = issue.number, error = %err, "issue watcher: action dispatch failed");
            }

            if let Err(err) = transition(self.client.as_ref(), &self.config.owner, &self.config.repo, issue).await {
                warn!(issue = issue.number, error = %err, "issue watcher: transition failed");
            }
        }

        if issue.has_label(LABEL_LGTM) && self.config.auto_merge_lgtm {
            self.auto_merge(issue.number).await;
        }

        self.track_label_changes(issue).await;
    }

    async fn track_label_changes(&self, issue: &Issue) {
        let old = {
            let mut map = self.last_labels.lock().await;
            let old = map.get(&issue.number).cloned().unwrap_or_default();
            map.insert(issue.number, issue.labels.clone());
            old
        };

        let Some(notifier) = &self.notifier else { return };
        let events = diff_events(&self.config.owner, &self.config.repo, issue.number, issue.title.as_deref(), &old, &issue.labels);
        for event in events {
            notifier.send(event).await;
        }
    }

    /// Auto-merge subroutine for an issue bearing `status:lgtm`. Cleanup of
    /// merged-away resources is an explicitly external concern; this only
    /// drives the merge call itself.
    async fn auto_merge(&self, issue_number: u64) {
        let pr = match self.client.get_pull_request_for_issue(&self.config.owner, &self.config.repo, issue_number).await {
            Ok(Some(pr)) => pr,
            Ok(None) => return,
            Err(err) => {
                warn!(issue = issue_number, error = %err, "issue watcher: get_pull_request_for_issue failed");
                return;
            }
        };

        self.merge_metrics.lock().await.record_attempt(Utc::now());

        if !self.resolve_mergeable(pr.number).await {
            self.merge_metrics.lock().await.record_failure("not_mergeable");
            return;
        }

        match self.client.merge_pull_request(&self.config.owner, &self.config.repo, pr.number).await {
            Ok(()) => {
                self.merge_metrics.lock().await.record_success();
            }
            Err(err) => {
                warn!(pr = pr.number, error = %err, "issue watcher: merge_pull_request failed");
                self.merge_metrics.lock().await.record_failure("merge_call_failed");
            }
        }
    }

    /// Refreshes PR status up to 3 times, `2s * attempt` apart, stopping
    /// early once mergeability resolves away from UNKNOWN. Three
    /// consecutive UNKNOWNs is treated as "not mergeable", not an error.
    async fn resolve_mergeable(&self, pr_number: u64) -> bool {
        for attempt in 1..=3u32 {
            let status = match self.client.get_pull_request_status(&self.config.owner, &self.config.repo, pr_number).await {
                Ok(status) => status,
                Err(err) => {
                    warn!(pr = pr_number, error = %err, "issue watcher: get_pull_request_status failed");
                    return false;
                }
            };

            match status.mergeable {
                Mergeable::Unknown => {
                    if attempt < 3 {
                        tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
                        continue;
                    }
                    return false;
                }
                Mergeable::Mergeable if status.state == PrState::Open && !status.is_draft => return true,
                _ => return false,
            }
        }
        false
    }
}
