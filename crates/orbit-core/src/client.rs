use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::retry::{classify_message, ErrorClass, RetryHint};
use crate::types::{Issue, PullRequest};

/// Error surface exposed by a `GitHubClient` implementation. Deliberately
/// coarse: the core only needs enough to classify retryability and log a
/// cause, not a full mirror of the underlying transport's error type.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rate limited (resets in {reset_in_secs}s): {message}")]
    RateLimited { message: String, reset_in_secs: u64 },
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Classifies a `ClientError` for the retry executor. Rate limits carry
/// their own reset hint; everything else falls back to message-substring
/// classification (5xx, timeouts, DNS, connection-refused).
pub fn classify(err: &ClientError) -> RetryHint {
    match err {
        ClientError::RateLimited { reset_in_secs, .. } => {
            RetryHint::rate_limited(std::time::Duration::from_secs(*reset_in_secs))
        }
        ClientError::Other(message) => match classify_message(message) {
            ErrorClass::Retryable => RetryHint::retryable(),
            ErrorClass::NonRetryable => RetryHint::non_retryable(),
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// The GitHub API surface the core consumes. Concrete transport (REST,
/// GraphQL, a CLI shim) lives outside the core; implementations are
/// injected at construction time.
#[async_trait]
pub trait GitHubClient: Send + Sync {
    async fn list_issues_by_labels(
        &self,
        owner: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<Issue>, ClientError>;

    async fn list_all_open_issues(&self, owner: &str, repo: &str) -> Result<Vec<Issue>, ClientError>;

    async fn list_pull_requests_by_labels(
        &self,
        owner: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<PullRequest>, ClientError>;

    async fn add_label(&self, owner: &str, repo: &str, issue: u64, label: &str) -> Result<(), ClientError>;

    async fn remove_label(&self, owner: &str, repo: &str, issue: u64, label: &str) -> Result<(), ClientError>;

    /// Atomic variant. The default implementation emulates it as
    /// remove-then-add for clients that don't expose a native one.
    async fn transition_labels(
        &self,
        owner: &str,
        repo: &str,
        issue: u64,
        from: &str,
        to: &str,
    ) -> Result<(), ClientError> {
        self.remove_label(owner, repo, issue, from).await?;
        self.add_label(owner, repo, issue, to).await
    }

    async fn get_pull_request_for_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: u64,
    ) -> Result<Option<PullRequest>, ClientError>;

    async fn get_pull_request_status(&self, owner: &str, repo: &str, pr: u64) -> Result<PullRequest, ClientError>;

    async fn merge_pull_request(&self, owner: &str, repo: &str, pr: u64) -> Result<(), ClientError>;

    async fn get_closing_issue_number(&self, owner: &str, repo: &str, pr: u64) -> Result<Option<u64>, ClientError>;

    async fn get_rate_limit(&self) -> Result<RateLimits, ClientError>;

    /// Posts a comment on an issue or PR (GitHub treats both as issues for
    /// commenting purposes). Defaults to a no-op so test doubles that don't
    /// care about commentary don't need to implement it.
    async fn post_comment(&self, _owner: &str, _repo: &str, _issue: u64, _body: &str) -> Result<(), ClientError> {
        Ok(())
    }
}
