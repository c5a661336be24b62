use async_trait::async_trait;
use octocrab::models::IssueState;
use octocrab::params::State as QueryState;
use octocrab::Octocrab;
use serde_json::json;

use orbit_core::client::{ClientError, GitHubClient, RateLimits};
use orbit_core::types::{Issue, Mergeable, PrState, PullRequest};

use crate::errors::map_err;

/// Real GitHub REST/GraphQL client backing `GitHubClient`. REST covers
/// listing, labels, and merge; GraphQL fills the two gaps REST has no
/// endpoint for (an issue's linked PR, and a PR's closing issue).
pub struct OctocrabClient {
    inner: Octocrab,
}

impl OctocrabClient {
    pub fn new(token: impl Into<String>) -> anyhow::Result<Self> {
        let inner = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self { inner })
    }
}

fn to_core_issue(issue: octocrab::models::issues::Issue) -> Issue {
    Issue {
        number: issue.number,
        title: Some(issue.title),
        labels: issue.labels.into_iter().map(|l| l.name).collect(),
    }
}

fn to_core_pr(pr: octocrab::models::pulls::PullRequest) -> PullRequest {
    let state = if pr.merged_at.is_some() {
        PrState::Merged
    } else {
        match pr.state {
            Some(IssueState::Closed) => PrState::Closed,
            _ => PrState::Open,
        }
    };
    let mergeable = match pr.mergeable {
        Some(true) => Mergeable::Mergeable,
        Some(false) => Mergeable::Conflicting,
        None => Mergeable::Unknown,
    };
    PullRequest {
        number: pr.number,
        state,
        mergeable,
        is_draft: pr.draft.unwrap_or(false),
        checks_status: String::new(),
        head_ref: pr.head.ref_field,
        labels: pr.labels.unwrap_or_default().into_iter().map(|l| l.name).collect(),
    }
}

#[async_trait]
impl GitHubClient for OctocrabClient {
    async fn list_issues_by_labels(
        &self,
        owner: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<Issue>, ClientError> {
        let page = self
            .inner
            .issues(owner, repo)
            .list()
            .labels(labels)
            .state(QueryState::Open)
            .send()
            .await
            .map_err(map_err)?;
        Ok(page.items.into_iter().filter(|i| i.pull_request.is_none()).map(to_core_issue).collect())
    }

    async fn list_all_open_issues(&self, owner: &str, repo: &str) -> Result<Vec<Issue>, ClientError> {
        let page = self
            .inner
            .issues(owner, repo)
            .list()
            .state(QueryState::Open)
            .send()
            .await
            .map_err(map_err)?;
        Ok(page.items.into_iter().filter(|i| i.pull_request.is_none()).map(to_core_issue).collect())
    }

    async fn list_pull_requests_by_labels(
        &self,
        owner: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<PullRequest>, ClientError> {
        // The REST pulls endpoint has no label filter; labels live on the
        // issues representation of a PR, so list issues-with-PR and fetch
        // each matching PR individually.
        let page = self
            .inner
            .issues(owner, repo)
            .list()
            .labels(labels)
            .state(QueryState::Open)
            .send()
            .await
            .map_err(map_err)?;

        let mut prs = Vec::new();
        for item in page.items.into_iter().filter(|i| i.pull_request.is_some()) {
            let pr = self.inner.pulls(owner, repo).get(item.number).await.map_err(map_err)?;
            prs.push(to_core_pr(pr));
        }
        Ok(prs)
    }

    async fn add_label(&self, owner: &str, repo: &str, issue: u64, label: &str) -> Result<(), ClientError> {
        self.inner
            .issues(owner, repo)
            .add_labels(issue, &[label.to_string()])
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn remove_label(&self, owner: &str, repo: &str, issue: u64, label: &str) -> Result<(), ClientError> {
        self.inner.issues(owner, repo).remove_label(issue, label).await.map_err(map_err)?;
        Ok(())
    }

    async fn get_pull_request_for_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: u64,
    ) -> Result<Option<PullRequest>, ClientError> {
        let query = r#"
            query($owner: String!, $repo: String!, $number: Int!) {
              repository(owner: $owner, name: $repo) {
                issue(number: $number) {
                  timelineItems(last: 50, itemTypes: [CONNECTED_EVENT, CROSS_REFERENCED_EVENT]) {
                    nodes {
                      __typename
                      ... on ConnectedEvent { subject { __typename ... on PullRequest { number } } }
                      ... on CrossReferencedEvent { source { __typename ... on PullRequest { number } } }
                    }
                  }
                }
              }
            }
        "#;
        let body = json!({
            "query": query,
            "variables": { "owner": owner, "repo": repo, "number": issue },
        });
        let response: serde_json::Value = self.inner.graphql(&body).await.map_err(map_err)?;

        let pr_number = response
            .pointer("/data/repository/issue/timelineItems/nodes")
            .and_then(|nodes| nodes.as_array())
            .and_then(|nodes| {
                nodes.iter().find_map(|node| {
                    node.pointer("/subject/number")
                        .or_else(|| node.pointer("/source/number"))
                        .and_then(|n| n.as_u64())
                })
            });

        match pr_number {
            Some(number) => {
                let pr = self.inner.pulls(owner, repo).get(number).await.map_err(map_err)?;
                Ok(Some(to_core_pr(pr)))
            }
            None => Ok(None),
        }
    }

    async fn get_pull_request_status(&self, owner: &str, repo: &str, pr: u64) -> Result<PullRequest, ClientError> {
        let pr = self.inner.pulls(owner, repo).get(pr).await.map_err(map_err)?;
        Ok(to_core_pr(pr))
    }

    async fn merge_pull_request(&self, owner: &str, repo: &str, pr: u64) -> Result<(), ClientError> {
        self.inner.pulls(owner, repo).merge(pr).send().await.map_err(map_err)?;
        Ok(())
    }

    async fn get_closing_issue_number(&self, owner: &str, repo: &str, pr: u64) -> Result<Option<u64>, ClientError> {
        let query = r#"
            query($owner: String!, $repo: String!, $number: Int!) {
              repository(owner: $owner, name: $repo) {
                pullRequest(number: $number) {
                  closingIssuesReferences(first: 1) { nodes { number } }
                }
              }
            }
        "#;
        let body = json!({
            "query": query,
            "variables": { "owner": owner, "repo": repo, "number": pr },
        });
        let response: serde_json::Value = self.inner.graphql(&body).await.map_err(map_err)?;
        let number = response
            .pointer("/data/repository/pullRequest/closingIssuesReferences/nodes/0/number")
            .and_then(|n| n.as_u64());
        Ok(number)
    }

    async fn post_comment(&self, owner: &str, repo: &str, issue: u64, body: &str) -> Result<(), ClientError> {
        self.inner.issues(owner, repo).create_comment(issue, body).await.map_err(map_err)?;
        Ok(())
    }

    async fn get_rate_limit(&self) -> Result<RateLimits, ClientError> {
        let limits = self.inner.ratelimit().get().await.map_err(map_err)?;
        let core = limits.resources.core;
        Ok(RateLimits {
            limit: core.limit as u32,
            remaining: core.remaining as u32,
            reset_at: chrono::DateTime::from_timestamp(core.reset as i64, 0).unwrap_or_else(chrono::Utc::now),
        })
    }
}
