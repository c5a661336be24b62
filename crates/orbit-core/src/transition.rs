use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::client::GitHubClient;
use crate::types::{Issue, TRANSITION_RULES};

const MAX_ATTEMPTS: u32 = 3;

/// Scans `issue`'s labels in trigger-priority order and determines the
/// (from, to) pair a transition should apply. `None` when no trigger
/// matches — the caller treats this as a no-op success.
fn resolve_pair(issue: &Issue) -> Option<(&'static str, &'static str)> {
    TRANSITION_RULES
        .iter()
        .find(|rule| issue.has_label(rule.trigger))
        .map(|rule| (rule.trigger, rule.target()))
}

/// Atomically moves `issue` from its trigger label to its execution label
/// (or, for `requires-changes`, straight to `status:ready`). Retries the
/// whole pair up to `MAX_ATTEMPTS` times with linear backoff. A no-op when
/// no trigger label is present.
pub async fn transition(
    client: &dyn GitHubClient,
    owner: &str,
    repo: &str,
    issue: &Issue,
) -> Result<()> {
    let Some((from, to)) = resolve_pair(issue) else {
        return Ok(());
    };

    for attempt in 1..=MAX_ATTEMPTS {
        match client.transition_labels(owner, repo, issue.number, from, to).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < MAX_ATTEMPTS => {
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                let _ = err;
            }
            Err(err) => {
                return Err(anyhow!(
                    "failed to transition '{from}' -> '{to}' on issue #{} (attempt {MAX_ATTEMPTS}/{MAX_ATTEMPTS}): {err}",
                    issue.number,
                ));
            }
        }
    }

    unreachable!("loop either returns Ok, returns Err, or retries")
}
