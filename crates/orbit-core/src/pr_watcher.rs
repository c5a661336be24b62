use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, warn};

use crate::action::ActionFactory;
use crate::client::{self, GitHubClient};
use crate::dispatch::execute_action;
use crate::health::Health;
use crate::retry::execute;
use crate::types::{
    AutoMergeMetrics, HealthReport, Issue, Mergeable, PrState, PullRequest, LABEL_LGTM, LABEL_REQUIRES_CHANGES,
};

pub struct PrWatcherConfig {
    pub owner: String,
    pub repo: String,
    pub poll_interval: Duration,
    pub auto_merge_lgtm: bool,
    pub auto_revise_pr: bool,
}

/// Periodic poller for pull requests carrying `status:lgtm` or
/// `status:requires-changes`. A PR bearing both labels only ever takes
/// the merge path; requires-changes is never even checked once lgtm
/// is present.
pub struct PrWatcher {
    config: PrWatcherConfig,
    client: Arc<dyn GitHubClient>,
    factory: Option<Arc<dyn ActionFactory>>,
    health: Health,
    merge_metrics: Mutex<AutoMergeMetrics>,
}

impl PrWatcher {
    pub fn new(
        config: PrWatcherConfig,
        client: Arc<dyn GitHubClient>,
        factory: Option<Arc<dyn ActionFactory>>,
    ) -> Result<Arc<Self>> {
        if config.owner.is_empty() {
            bail!("pr watcher: owner must not be empty");
        }
        if config.repo.is_empty() {
            bail!("pr watcher: repo must not be empty");
        }
        if config.poll_interval < Duration::from_secs(1) {
            bail!("pr watcher: poll_interval must be >= 1s");
        }
        Ok(Arc::new(Self {
            config,
            client,
            factory,
            health: Health::new(),
            merge_metrics: Mutex::new(AutoMergeMetrics::default()),
        }))
    }

    pub async fn health_report(&self, max_inactivity: Duration) -> HealthReport {
        self.health.check_health(max_inactivity, Utc::now()).await
    }

    pub async fn merge_metrics(&self) -> AutoMergeMetrics {
        self.merge_metrics.lock().await.clone()
    }

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
                Ok(Err(err)) => error!(error = %err, "pr watcher: cycle returned an error"),
                Err(join_err) => error!(error = %join_err, "pr watcher: cycle panicked"),
            }
        }
    }

    pub async fn tick(self: &Arc<Self>) -> Result<()> {
        self.health.record_start(Utc::now()).await;

        let labels = vec![LABEL_LGTM.to_string(), LABEL_REQUIRES_CHANGES.to_string()];
        let prs = match execute(
            3,
            Duration::from_secs(1),
            |_attempt| self.client.list_pull_requests_by_labels(&self.config.owner, &self.config.repo, &labels),
            client::classify,
        )
        .await
        {
            Ok(prs) => prs,
            Err(err) => {
                self.health.record_failure().await;
                warn!(error = %err, "pr watcher: list_pull_requests_by_labels failed, retrying next tick");
                return Ok(());
            }
        };

        for pr in &prs {
            if pr.state != PrState::Open || pr.is_draft {
                continue;
            }
            let watcher = self.clone();
            let pr = pr.clone();
            let handle = tokio::spawn(async move { watcher.process_pr(&pr).await });
            if let Err(join_err) = handle.await {
                error!(error = %join_err, "pr watcher: per-pr callback panicked");
            }
        }

        self.health.record_success().await;
        Ok(())
    }

    async fn process_pr(self: &Arc<Self>, pr: &PullRequest) {
        if pr.has_label(LABEL_LGTM) {
            if self.config.auto_merge_lgtm {
                self.auto_merge(pr).await;
            }
            return;
        }

        if pr.has_label(LABEL_REQUIRES_CHANGES) {
            if !self.config.auto_revise_pr {
                debug!(pr = pr.number, "pr watcher: requires-changes seen, auto-revise disabled");
                return;
            }
            let Some(factory) = &self.factory else {
                debug!(pr = pr.number, "pr watcher: requires-changes seen, no action manager attached");
                return;
            };

            let issue_number = match self.client.get_closing_issue_number(&self.config.owner, &self.config.repo, pr.number).await {
                Ok(Some(n)) => n,
                Ok(None) => {
                    debug!(pr = pr.number, "pr watcher: no closing issue found");
                    return;
                }
                Err(err) => {
                    warn!(pr = pr.number, error = %err, "pr watcher: get_closing_issue_number failed");
                    return;
                }
            };

            let synthetic = Issue::new(issue_number, [LABEL_REQUIRES_CHANGES]);
            if let Err(err) = execute_action(factory.as_ref(), &synthetic).await {
                warn!(pr = pr.number, issue = issue_number, error = %err, "pr watcher: auto-revise dispatch failed");
            }
            return;
        }

        debug!(pr = pr.number, "pr watcher: neither lgtm nor requires-changes, skipping");
    }

    async fn auto_merge(&self, pr: &PullRequest) {
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
                warn!(pr = pr.number, error = %err, "pr watcher: merge_pull_request failed");
                self.merge_metrics.lock().await.record_failure("merge_call_failed");
            }
        }
    }

    async fn resolve_mergeable(&self, pr_number: u64) -> bool {
        for attempt in 1..=3u32 {
            let status = match self.client.get_pull_request_status(&self.config.owner, &self.config.repo, pr_number).await {
                Ok(status) => status,
                Err(err) => {
                    warn!(pr = pr_number, error = %err, "pr watcher: get_pull_request_status failed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StubFactory;
    use crate::client::{ClientError, RateLimits};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct ScriptedClient {
        prs: Vec<PullRequest>,
        mergeable_sequence: StdMutex<Vec<Mergeable>>,
        merge_calls: StdMutex<u32>,
        closing_issue: Option<u64>,
    }

    #[async_trait]
    impl GitHubClient for ScriptedClient {
        async fn list_issues_by_labels(&self, _o: &str, _r: &str, _l: &[String]) -> Result<Vec<Issue>, ClientError> {
            Ok(vec![])
        }
        async fn list_all_open_issues(&self, _o: &str, _r: &str) -> Result<Vec<Issue>, ClientError> {
            Ok(vec![])
        }
        async fn list_pull_requests_by_labels(
            &self,
            _o: &str,
            _r: &str,
            _l: &[String],
        ) -> Result<Vec<PullRequest>, ClientError> {
            Ok(self.prs.clone())
        }
        async fn add_label(&self, _o: &str, _r: &str, _i: u64, _l: &str) -> Result<(), ClientError> {
            Ok(())
        }
        async fn remove_label(&self, _o: &str, _r: &str, _i: u64, _l: &str) -> Result<(), ClientError> {
            Ok(())
        }
        async fn get_pull_request_for_issue(
            &self,
            _o: &str,
            _r: &str,
            _i: u64,
        ) -> Result<Option<PullRequest>, ClientError> {
            Ok(None)
        }
        async fn get_pull_request_status(&self, _o: &str, _r: &str, pr_number: u64) -> Result<PullRequest, ClientError> {
            let mut seq = self.mergeable_sequence.lock().unwrap();
            let mergeable = if seq.len() > 1 { seq.remove(0) } else { seq[0] };
            let mut pr = self.prs.iter().find(|p| p.number == pr_number).cloned().unwrap();
            pr.mergeable = mergeable;
            Ok(pr)
        }
        async fn merge_pull_request(&self, _o: &str, _r: &str, _p: u64) -> Result<(), ClientError> {
            *self.merge_calls.lock().unwrap() += 1;
            Ok(())
        }
        async fn get_closing_issue_number(&self, _o: &str, _r: &str, _p: u64) -> Result<Option<u64>, ClientError> {
            Ok(self.closing_issue)
        }
        async fn get_rate_limit(&self) -> Result<RateLimits, ClientError> {
            unimplemented!()
        }
    }

    fn config() -> PrWatcherConfig {
        PrWatcherConfig {
            owner: "acme".into(),
            repo: "widgets".into(),
            poll_interval: Duration::from_secs(20),
            auto_merge_lgtm: true,
            auto_revise_pr: true,
        }
    }

    fn pr(number: u64, labels: Vec<&str>) -> PullRequest {
        PullRequest {
            number,
            state: PrState::Open,
            mergeable: Mergeable::Unknown,
            is_draft: false,
            checks_status: "pending".into(),
            head_ref: "feature".into(),
            labels: labels.into_iter().map(String::from).collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lgtm_dominates_requires_changes() {
        let client: Arc<dyn GitHubClient> = Arc::new(ScriptedClient {
            prs: vec![pr(1, vec![LABEL_LGTM, LABEL_REQUIRES_CHANGES])],
            mergeable_sequence: StdMutex::new(vec![Mergeable::Mergeable]),
            merge_calls: StdMutex::new(0),
            closing_issue: Some(99),
        });
        let watcher = PrWatcher::new(config(), client.clone(), Some(Arc::new(StubFactory))).unwrap();
        watcher.tick().await.unwrap();
        let metrics = watcher.merge_metrics().await;
        assert_eq!(metrics.successful_merges, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn requires_changes_dispatches_via_closing_issue() {
        let client: Arc<dyn GitHubClient> = Arc::new(ScriptedClient {
            prs: vec![pr(2, vec![LABEL_REQUIRES_CHANGES])],
            mergeable_sequence: StdMutex::new(vec![Mergeable::Unknown]),
            merge_calls: StdMutex::new(0),
            closing_issue: Some(42),
        });
        let watcher = PrWatcher::new(config(), client, Some(Arc::new(StubFactory))).unwrap();
        watcher.tick().await.unwrap();
        let metrics = watcher.merge_metrics().await;
        assert_eq!(metrics.total_attempts, 0);
    }

    #[test]
    fn rejects_empty_owner() {
        let mut cfg = config();
        cfg.owner = String::new();
        let client: Arc<dyn GitHubClient> = Arc::new(ScriptedClient {
            prs: vec![],
            mergeable_sequence: StdMutex::new(vec![Mergeable::Unknown]),
            merge_calls: StdMutex::new(0),
            closing_issue: None,
        });
        assert!(PrWatcher::new(cfg, client, None).is_err());
    }
}
