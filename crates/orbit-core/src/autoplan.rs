use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{self, GitHubClient};
use crate::retry::{execute, RetryError};
use crate::types::{ALL_STATUS_LABELS, LABEL_NEEDS_PLAN};

const MAX_ATTEMPTS: u32 = 3;

/// Serializes election within one process: a scalar hung off the watcher
/// instance, not a module-level singleton, so multiple watcher instances
/// in one process don't contend on each other's elections.
#[derive(Default)]
pub struct AutoPlanElector {
    lock: Mutex<()>,
    last_election: Mutex<Option<DateTime<Utc>>>,
}

impl AutoPlanElector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_election(&self) -> Option<DateTime<Utc>> {
        *self.last_election.lock().await
    }

    /// Runs one election attempt, serialized against any concurrent call on
    /// the same elector. No-ops when `enabled` is false. The listing calls
    /// go through the shared retry executor; the optimistic re-check race is
    /// not retried — losing it is success, not failure.
    pub async fn maybe_elect(
        &self,
        client: &dyn GitHubClient,
        owner: &str,
        repo: &str,
        enabled: bool,
    ) -> Result<()> {
        if !enabled {
            return Ok(());
        }
        let _guard = self.lock.lock().await;

        let active = list_status_labeled(client, owner, repo).await?;
        if !active.is_empty() {
            debug!(owner, repo, "auto-plan: pipeline busy, skipping election");
            return Ok(());
        }

        let open_issues = execute(
            MAX_ATTEMPTS,
            Duration::from_secs(1),
            |_attempt| client.list_all_open_issues(owner, repo),
            client::classify,
        )
        .await
        .map_err(retry_to_anyhow)?;

        let candidate = open_issues
            .into_iter()
            .filter(|issue| !issue.has_any_status_label())
            .min_by_key(|issue| issue.number);

        let Some(candidate) = candidate else {
            debug!(owner, repo, "auto-plan: no eligible candidate");
            return Ok(());
        };

        // Optimistic re-check: another orchestrator may have labeled a
        // candidate between the first listing and now.
        let recheck = list_status_labeled(client, owner, repo).await?;
        if !recheck.is_empty() {
            debug!(owner, repo, "auto-plan: lost optimistic race, not acting");
            return Ok(());
        }

        execute(
            MAX_ATTEMPTS,
            Duration::from_secs(1),
            |_attempt| client.add_label(owner, repo, candidate.number, LABEL_NEEDS_PLAN),
            client::classify,
        )
        .await
        .map_err(retry_to_anyhow)?;

        *self.last_election.lock().await = Some(Utc::now());
        info!(owner, repo, issue = candidate.number, "auto-plan: elected issue");
        Ok(())
    }
}

async fn list_status_labeled(
    client: &dyn GitHubClient,
    owner: &str,
    repo: &str,
) -> Result<Vec<crate::types::Issue>> {
    let labels: Vec<String> = ALL_STATUS_LABELS.iter().map(|l| l.to_string()).collect();
    execute(
        MAX_ATTEMPTS,
        Duration::from_secs(1),
        |_attempt| client.list_issues_by_labels(owner, repo, &labels),
        client::classify,
    )
    .await
    .map_err(retry_to_anyhow)
}

fn retry_to_anyhow(err: RetryError<client::ClientError>) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, RateLimits};
    use crate::types::{Issue, PullRequest};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FakeClient {
        status_labeled: StdMutex<Vec<Issue>>,
        open_issues: Vec<Issue>,
        applied: StdMutex<Vec<(u64, String)>>,
        // Injected into the status-labeled set starting from the *second*
        // `list_issues_by_labels` call (the optimistic re-check), never the
        // first (the busy-pipeline guard) — otherwise the busy guard would
        // short-circuit before the re-check is ever reached.
        recheck_injects: StdMutex<Option<Issue>>,
        status_calls: StdMutex<u32>,
    }

    #[async_trait]
    impl GitHubClient for FakeClient {
        async fn list_issues_by_labels(
            &self,
            _owner: &str,
            _repo: &str,
            _labels: &[String],
        ) -> Result<Vec<Issue>, ClientError> {
            let call_number = {
                let mut calls = self.status_calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            let mut guard = self.status_labeled.lock().unwrap();
            if call_number >= 2 {
                if let Some(injected) = self.recheck_injects.lock().unwrap().take() {
                    guard.push(injected);
                }
            }
            Ok(guard.clone())
        }
        async fn list_all_open_issues(&self, _owner: &str, _repo: &str) -> Result<Vec<Issue>, ClientError> {
            Ok(self.open_issues.clone())
        }
        async fn list_pull_requests_by_labels(
            &self,
            _o: &str,
            _r: &str,
            _l: &[String],
        ) -> Result<Vec<PullRequest>, ClientError> {
            unimplemented!()
        }
        async fn add_label(&self, _owner: &str, _repo: &str, issue: u64, label: &str) -> Result<(), ClientError> {
            self.applied.lock().unwrap().push((issue, label.to_string()));
            Ok(())
        }
        async fn remove_label(&self, _o: &str, _r: &str, _i: u64, _l: &str) -> Result<(), ClientError> {
            unimplemented!()
        }
        async fn get_pull_request_for_issue(
            &self,
            _o: &str,
            _r: &str,
            _i: u64,
        ) -> Result<Option<PullRequest>, ClientError> {
            unimplemented!()
        }
        async fn get_pull_request_status(&self, _o: &str, _r: &str, _p: u64) -> Result<PullRequest, ClientError> {
            unimplemented!()
        }
        async fn merge_pull_request(&self, _o: &str, _r: &str, _p: u64) -> Result<(), ClientError> {
            unimplemented!()
        }
        async fn get_closing_issue_number(&self, _o: &str, _r: &str, _p: u64) -> Result<Option<u64>, ClientError> {
            unimplemented!()
        }
        async fn get_rate_limit(&self) -> Result<RateLimits, ClientError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn last_election_is_recorded_on_success() {
        let client = FakeClient {
            status_labeled: StdMutex::new(vec![]),
            open_issues: vec![Issue::new(3, Vec::<String>::new())],
            applied: StdMutex::new(vec![]),
            recheck_injects: StdMutex::new(None),
            status_calls: StdMutex::new(0),
        };
        let elector = AutoPlanElector::new();
        assert!(elector.last_election().await.is_none());
        elector.maybe_elect(&client, "acme", "widgets", true).await.unwrap();
        assert!(elector.last_election().await.is_some());
    }

    #[tokio::test]
    async fn elects_lowest_numbered_unlabeled_issue() {
        let client = FakeClient {
            status_labeled: StdMutex::new(vec![]),
            open_issues: vec![
                Issue::new(10, ["status:implementing"]),
                Issue::new(5, ["status:ready"]),
                Issue::new(3, ["documentation"]),
                Issue::new(15, Vec::<String>::new()),
            ],
            applied: StdMutex::new(vec![]),
            recheck_injects: StdMutex::new(None),
            status_calls: StdMutex::new(0),
        };
        let elector = AutoPlanElector::new();
        elector.maybe_elect(&client, "acme", "widgets", true).await.unwrap();
        assert_eq!(*client.applied.lock().unwrap(), vec![(3, "status:needs-plan".to_string())]);
    }

    /// Covers the optimistic re-check at `maybe_elect`'s second
    /// `list_status_labeled` call: the first listing must come back empty
    /// (so the busy-pipeline guard doesn't short-circuit before a candidate
    /// is even picked) and only the re-check sees the race winner's label.
    #[tokio::test]
    async fn optimistic_race_loss_skips_without_error() {
        let client = FakeClient {
            status_labeled: StdMutex::new(vec![]),
            open_issues: vec![
                Issue::new(10, ["status:implementing"]),
                Issue::new(5, ["status:ready"]),
                Issue::new(3, ["documentation"]),
                Issue::new(15, Vec::<String>::new()),
            ],
            applied: StdMutex::new(vec![]),
            recheck_injects: StdMutex::new(Some(Issue::new(3, ["status:needs-plan"]))),
            status_calls: StdMutex::new(0),
        };
        let elector = AutoPlanElector::new();
        elector.maybe_elect(&client, "acme", "widgets", true).await.unwrap();
        assert!(client.applied.lock().unwrap().is_empty());
        // Proves the busy-pipeline guard did NOT short-circuit: both the
        // first listing and the re-check listing ran.
        assert_eq!(*client.status_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn disabled_feature_is_a_noop() {
        let client = FakeClient {
            status_labeled: StdMutex::new(vec![]),
            open_issues: vec![Issue::new(3, Vec::<String>::new())],
            applied: StdMutex::new(vec![]),
            recheck_injects: StdMutex::new(None),
            status_calls: StdMutex::new(0),
        };
        let elector = AutoPlanElector::new();
        elector.maybe_elect(&client, "acme", "widgets", false).await.unwrap();
        assert!(client.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn busy_pipeline_skips_election() {
        let client = FakeClient {
            status_labeled: StdMutex::new(vec![Issue::new(1, ["status:implementing"])]),
            open_issues: vec![Issue::new(3, Vec::<String>::new())],
            applied: StdMutex::new(vec![]),
            recheck_injects: StdMutex::new(None),
            status_calls: StdMutex::new(0),
        };
        let elector = AutoPlanElector::new();
        elector.maybe_elect(&client, "acme", "widgets", true).await.unwrap();
        assert!(client.applied.lock().unwrap().is_empty());
    }
}
