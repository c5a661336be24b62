//! An in-memory `GitHubClient` for tests. Not covered by semver stability;
//! exposed publicly so integration tests in `tests/` and downstream crates
//! can exercise the watchers without a real GitHub connection.

use std::sync::Mutex;

use std::sync::Arc;

use async_trait::async_trait;

use crate::action::{ActionFactory, PhaseAction};
use crate::client::{ClientError, GitHubClient, RateLimits};
use crate::types::{Issue, PullRequest};

/// A phase action that always succeeds without side effects.
pub struct NoopAction;

#[async_trait]
impl PhaseAction for NoopAction {
    async fn execute(&self, _issue: &Issue) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An `ActionFactory` that produces only `NoopAction`s, for tests that care
/// about dispatch/transition behavior and not about phase side effects.
pub struct StubFactory;

impl ActionFactory for StubFactory {
    fn create_plan(&self) -> Arc<dyn PhaseAction> {
        Arc::new(NoopAction)
    }
    fn create_implementation(&self) -> Arc<dyn PhaseAction> {
        Arc::new(NoopAction)
    }
    fn create_review(&self) -> Arc<dyn PhaseAction> {
        Arc::new(NoopAction)
    }
    fn create_revise(&self) -> Arc<dyn PhaseAction> {
        Arc::new(NoopAction)
    }
    fn create_noop(&self) -> Arc<dyn PhaseAction> {
        Arc::new(NoopAction)
    }
}

#[derive(Default)]
pub struct MockGitHubClient {
    pub issues: Mutex<Vec<Issue>>,
    pub pull_requests: Mutex<Vec<PullRequest>>,
    pub issue_to_pr: Mutex<Vec<(u64, u64)>>,
    pub pr_to_closing_issue: Mutex<Vec<(u64, u64)>>,
    pub applied_labels: Mutex<Vec<(u64, String)>>,
    pub removed_labels: Mutex<Vec<(u64, String)>>,
    pub merged_prs: Mutex<Vec<u64>>,
    /// Responses returned by successive calls to `get_pull_request_status`
    /// for a given PR number, consumed in order and held on the last entry
    /// once exhausted.
    pub status_sequence: Mutex<Vec<(u64, PullRequest)>>,
    pub comments: Mutex<Vec<(u64, String)>>,
    /// Applied to `issues` starting from the *second* `list_issues_by_labels`
    /// call, simulating a concurrent label write that lands between a
    /// caller's first listing and its re-check, never the first.
    pub race_inject: Mutex<Option<(u64, String)>>,
    list_issues_by_labels_calls: Mutex<u32>,
}

impl MockGitHubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issues(issues: Vec<Issue>) -> Self {
        Self { issues: Mutex::new(issues), ..Default::default() }
    }
}

#[async_trait]
impl GitHubClient for MockGitHubClient {
    async fn list_issues_by_labels(
        &self,
        _owner: &str,
        _repo: &str,
        labels: &[String],
    ) -> Result<Vec<Issue>, ClientError> {
        let call_number = {
            let mut calls = self.list_issues_by_labels_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call_number >= 2 {
            if let Some((issue, label)) = self.race_inject.lock().unwrap().take() {
                let mut issues = self.issues.lock().unwrap();
                if let Some(found) = issues.iter_mut().find(|i| i.number == issue) {
                    if !found.has_label(&label) {
                        found.labels.push(label);
                    }
                }
            }
        }
        Ok(self
            .issues
            .lock()
            .unwrap()
            .iter()
            .filter(|issue| labels.iter().any(|l| issue.has_label(l)))
            .cloned()
            .collect())
    }

    async fn list_all_open_issues(&self, _owner: &str, _repo: &str) -> Result<Vec<Issue>, ClientError> {
        Ok(self.issues.lock().unwrap().clone())
    }

    async fn list_pull_requests_by_labels(
        &self,
        _owner: &str,
        _repo: &str,
        labels: &[String],
    ) -> Result<Vec<PullRequest>, ClientError> {
        Ok(self
            .pull_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|pr| labels.iter().any(|l| pr.has_label(l)))
            .cloned()
            .collect())
    }

    async fn add_label(&self, _owner: &str, _repo: &str, issue: u64, label: &str) -> Result<(), ClientError> {
        self.applied_labels.lock().unwrap().push((issue, label.to_string()));
        let mut issues = self.issues.lock().unwrap();
        if let Some(found) = issues.iter_mut().find(|i| i.number == issue) {
            if !found.has_label(label) {
                found.labels.push(label.to_string());
            }
        }
        Ok(())
    }

    async fn remove_label(&self, _owner: &str, _repo: &str, issue: u64, label: &str) -> Result<(), ClientError> {
        self.removed_labels.lock().unwrap().push((issue, label.to_string()));
        let mut issues = self.issues.lock().unwrap();
        if let Some(found) = issues.iter_mut().find(|i| i.number == issue) {
            found.labels.retain(|l| l != label);
        }
        Ok(())
    }

    async fn get_pull_request_for_issue(
        &self,
        _owner: &str,
        _repo: &str,
        issue: u64,
    ) -> Result<Option<PullRequest>, ClientError> {
        let Some((_, pr_number)) = self.issue_to_pr.lock().unwrap().iter().find(|(i, _)| *i == issue).copied() else {
            return Ok(None);
        };
        Ok(self.pull_requests.lock().unwrap().iter().find(|pr| pr.number == pr_number).cloned())
    }

    async fn get_pull_request_status(&self, _owner: &str, _repo: &str, pr: u64) -> Result<PullRequest, ClientError> {
        let mut sequence = self.status_sequence.lock().unwrap();
        if let Some(pos) = sequence.iter().position(|(n, _)| *n == pr) {
            let (_, status) = sequence[pos].clone();
            if sequence.iter().filter(|(n, _)| *n == pr).count() > 1 {
                sequence.remove(pos);
            }
            return Ok(status);
        }
        drop(sequence);
        self.pull_requests
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.number == pr)
            .cloned()
            .ok_or_else(|| ClientError::other(format!("no such PR #{pr}")))
    }

    async fn merge_pull_request(&self, _owner: &str, _repo: &str, pr: u64) -> Result<(), ClientError> {
        self.merged_prs.lock().unwrap().push(pr);
        Ok(())
    }

    async fn get_closing_issue_number(&self, _owner: &str, _repo: &str, pr: u64) -> Result<Option<u64>, ClientError> {
        Ok(self.pr_to_closing_issue.lock().unwrap().iter().find(|(p, _)| *p == pr).map(|(_, issue)| *issue))
    }

    async fn post_comment(&self, _owner: &str, _repo: &str, issue: u64, body: &str) -> Result<(), ClientError> {
        self.comments.lock().unwrap().push((issue, body.to_string()));
        Ok(())
    }

    async fn get_rate_limit(&self) -> Result<RateLimits, ClientError> {
        Ok(RateLimits { limit: 5000, remaining: 5000, reset_at: chrono::Utc::now() })
    }
}
