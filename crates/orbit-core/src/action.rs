use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Issue;

/// One phase's side effect, opaque to the core: setting up a worktree,
/// driving an agent session, posting a comment. Produced by an
/// `ActionFactory` and invoked by the dispatcher.
#[async_trait]
pub trait PhaseAction: Send + Sync {
    async fn execute(&self, issue: &Issue) -> Result<()>;

    /// Precondition gate checked before `execute` is called. Defaults to
    /// always-eligible; actions with side-effect preconditions (worktree
    /// already exists, session already running) override it.
    async fn can_execute(&self, _issue: &Issue) -> bool {
        true
    }
}

/// Builds the five phase-action variants. The core holds only this factory,
/// never the concrete collaborators (client, worktree manager, agent
/// backend) the produced actions close over.
pub trait ActionFactory: Send + Sync {
    fn create_plan(&self) -> Arc<dyn PhaseAction>;
    fn create_implementation(&self) -> Arc<dyn PhaseAction>;
    fn create_review(&self) -> Arc<dyn PhaseAction>;
    fn create_revise(&self) -> Arc<dyn PhaseAction>;
    fn create_noop(&self) -> Arc<dyn PhaseAction>;
}

