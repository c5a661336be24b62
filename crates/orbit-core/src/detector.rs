use crate::types::{Issue, TRANSITION_RULES};

/// Pure decision over an issue's current label set: is a phase dispatch due,
/// and why. Calling this repeatedly with the same labels always yields the
/// same answer — the watcher carries no cache of prior decisions.
pub fn should_process(issue: &Issue) -> (bool, String) {
    for rule in TRANSITION_RULES {
        if !issue.has_label(rule.trigger) {
            continue;
        }
        let execution = rule.target();
        if issue.has_label(execution) {
            return (
                false,
                format!(
                    "Execution label '{execution}' already exists for trigger '{}'",
                    rule.trigger
                ),
            );
        }
        return (
            true,
            format!(
                "Trigger label '{}' found without corresponding execution label",
                rule.trigger
            ),
        );
    }
    (false, "No trigger labels found".to_string())
}
