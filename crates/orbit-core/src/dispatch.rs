use std::sync::Arc;

use anyhow::{bail, Result};

use crate::action::{ActionFactory, PhaseAction};
use crate::types::{Issue, Phase, TRANSITION_RULES};

/// Resolves the phase action a trigger label authorizes, scanning in
/// priority order (plan, implement, review, revise). `None` when no
/// trigger label is present.
fn get_action_for_issue(factory: &dyn ActionFactory, issue: &Issue) -> Option<Arc<dyn PhaseAction>> {
    let rule = TRANSITION_RULES.iter().find(|rule| issue.has_label(rule.trigger))?;
    Some(match rule.phase() {
        Phase::Plan => factory.create_plan(),
        Phase::Implement => factory.create_implementation(),
        Phase::Review => factory.create_review(),
        Phase::Revise => factory.create_revise(),
        Phase::NoOp => factory.create_noop(),
    })
}

/// Resolves and runs the action for `issue`. Surfaces `no action found` when
/// no trigger matches and `action cannot be executed` when the resolved
/// action's own precondition refuses.
pub async fn execute_action(factory: &dyn ActionFactory, issue: &Issue) -> Result<()> {
    let Some(action) = get_action_for_issue(factory, issue) else {
        bail!("no action found for issue #{}", issue.number);
    };
    if !action.can_execute(issue).await {
        bail!("action cannot be executed for issue #{}", issue.number);
    }
    action.execute(issue).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StubFactory;

    #[tokio::test]
    async fn dispatches_plan_action_for_needs_plan() {
        let factory = StubFactory;
        let issue = Issue::new(5, ["status:needs-plan", "status:ready"]);
        execute_action(&factory, &issue).await.unwrap();
    }

    #[tokio::test]
    async fn no_trigger_label_is_an_error() {
        let factory = StubFactory;
        let issue = Issue::new(1, ["documentation"]);
        let err = execute_action(&factory, &issue).await.unwrap_err();
        assert!(err.to_string().contains("no action found"));
    }
}
