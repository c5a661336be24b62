use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::warn;

use orbit_core::action::{ActionFactory, PhaseAction};
use orbit_core::client::GitHubClient;
use orbit_core::types::Issue;

use crate::session::AgentSession;
use crate::worktree::WorktreeManager;

#[derive(Debug, Clone, Copy)]
enum PhaseKind {
    Plan,
    Implementation,
    Review,
    Revise,
}

impl PhaseKind {
    fn slug(self) -> &'static str {
        match self {
            PhaseKind::Plan => "plan",
            PhaseKind::Implementation => "implement",
            PhaseKind::Review => "review",
            PhaseKind::Revise => "revise",
        }
    }

    fn prompt(self, issue: &Issue) -> String {
        let title = issue.title.as_deref().unwrap_or("(untitled)");
        match self {
            PhaseKind::Plan => format!("Write an implementation plan for issue #{} ({title})", issue.number),
            PhaseKind::Implementation => format!("Implement issue #{} ({title}) per its plan", issue.number),
            PhaseKind::Review => format!("Review the open pull request for issue #{} ({title})", issue.number),
            PhaseKind::Revise => format!("Address requested changes on issue #{} ({title})", issue.number),
        }
    }

    fn timeout(self) -> Duration {
        match self {
            PhaseKind::Plan => Duration::from_secs(10 * 60),
            PhaseKind::Implementation => Duration::from_secs(45 * 60),
            PhaseKind::Review => Duration::from_secs(15 * 60),
            PhaseKind::Revise => Duration::from_secs(20 * 60),
        }
    }

    /// Comment body posted after a successful run. Review and revise carry
    /// their own framing; plan and implementation share a generic summary
    /// format built from the agent's tail output.
    fn comment_body(self, issue: &Issue, tail: &str) -> String {
        match self {
            PhaseKind::Plan => format!("Implementation plan for #{}:\n\n{tail}", issue.number),
            PhaseKind::Implementation => format!("Implementation summary for #{}:\n\n{tail}", issue.number),
            PhaseKind::Review => format!("Review requested for #{}:\n\n{tail}", issue.number),
            PhaseKind::Revise => format!("Addressed requested changes for #{}:\n\n{tail}", issue.number),
        }
    }
}

fn tail_lines(lines: &[String], n: usize) -> String {
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

struct StandardAction {
    kind: PhaseKind,
    worktree: Arc<WorktreeManager>,
    agent: Arc<AgentSession>,
    client: Arc<dyn GitHubClient>,
    owner: String,
    repo: String,
    base_branch: String,
}

#[async_trait]
impl PhaseAction for StandardAction {
    async fn execute(&self, issue: &Issue) -> Result<()> {
        let branch = format!("issue-{}-{}", issue.number, self.kind.slug());

        let worktree = self.worktree.clone();
        let base_branch = self.base_branch.clone();
        let branch_for_blocking = branch.clone();
        let worktree_path = tokio::task::spawn_blocking(move || {
            if worktree.exists(&branch_for_blocking) {
                Ok(worktree.worktree_path(&branch_for_blocking))
            } else {
                worktree.create(&branch_for_blocking, &base_branch)
            }
        })
        .await
        .context("worktree setup task panicked")??;

        let prompt = self.kind.prompt(issue);
        let output = self.agent.run(&worktree_path, &prompt, Some(self.kind.timeout())).await?;
        if !output.success {
            bail!("agent session failed for issue #{} phase {:?}: {}", issue.number, self.kind, output.lines.join("\n"));
        }

        let worktree = self.worktree.clone();
        let commit_message = format!("{:?} for issue #{}", self.kind, issue.number);
        let commit_path = worktree_path.clone();
        let commit_branch = branch.clone();
        tokio::task::spawn_blocking(move || {
            worktree.commit_all(&commit_path, &commit_message)?;
            worktree.push_branch(&commit_path, &commit_branch)
        })
        .await
        .context("worktree commit/push task panicked")??;

        let body = self.kind.comment_body(issue, &tail_lines(&output.lines, 40));
        if let Err(err) = self.client.post_comment(&self.owner, &self.repo, issue.number, &body).await {
            warn!(issue = issue.number, error = %err, "phase action: post_comment failed, continuing");
        }

        Ok(())
    }
}

struct NoopAction;

#[async_trait]
impl PhaseAction for NoopAction {
    async fn execute(&self, _issue: &Issue) -> Result<()> {
        Ok(())
    }
}

/// Produces the five phase-action variants the dispatcher resolves trigger
/// labels to. Holds the worktree manager, agent session, and base branch
/// every standard action closes over; `revise` and `no-op` share the same
/// shape as `plan`/`implement`/`review` apart from their prompt template.
pub struct StandardActionFactory {
    worktree: Arc<WorktreeManager>,
    agent: Arc<AgentSession>,
    client: Arc<dyn GitHubClient>,
    owner: String,
    repo: String,
    base_branch: String,
}

impl StandardActionFactory {
    pub fn new(
        worktree: Arc<WorktreeManager>,
        agent: Arc<AgentSession>,
        client: Arc<dyn GitHubClient>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        Self { worktree, agent, client, owner: owner.into(), repo: repo.into(), base_branch: base_branch.into() }
    }

    fn action(&self, kind: PhaseKind) -> Arc<dyn PhaseAction> {
        Arc::new(StandardAction {
            kind,
            worktree: self.worktree.clone(),
            agent: self.agent.clone(),
            client: self.client.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            base_branch: self.base_branch.clone(),
        })
    }
}

impl ActionFactory for StandardActionFactory {
    fn create_plan(&self) -> Arc<dyn PhaseAction> {
        self.action(PhaseKind::Plan)
    }
    fn create_implementation(&self) -> Arc<dyn PhaseAction> {
        self.action(PhaseKind::Implementation)
    }
    fn create_review(&self) -> Arc<dyn PhaseAction> {
        self.action(PhaseKind::Review)
    }
    fn create_revise(&self) -> Arc<dyn PhaseAction> {
        self.action(PhaseKind::Revise)
    }
    fn create_noop(&self) -> Arc<dyn PhaseAction> {
        Arc::new(NoopAction)
    }
}
