use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Labels ────────────────────────────────────────────────────────────────

pub const LABEL_NEEDS_PLAN: &str = "status:needs-plan";
pub const LABEL_PLANNING: &str = "status:planning";
pub const LABEL_READY: &str = "status:ready";
pub const LABEL_IMPLEMENTING: &str = "status:implementing";
pub const LABEL_REVIEW_REQUESTED: &str = "status:review-requested";
pub const LABEL_REVIEWING: &str = "status:reviewing";
pub const LABEL_REQUIRES_CHANGES: &str = "status:requires-changes";
pub const LABEL_LGTM: &str = "status:lgtm";

pub const STATUS_PREFIX: &str = "status:";

/// One (trigger, execution) pair in priority order: plan > ready >
/// review-requested > requires-changes. `requires-changes` has no execution
/// label of its own — it transitions straight to `status:ready`.
#[derive(Debug, Clone, Copy)]
pub struct LabelTransitionRule {
    pub trigger: &'static str,
    pub execution: Option<&'static str>,
}

/// The closed set of `status:*` labels the auto-plan elector and PR watcher
/// query by. Used wherever "any status label" needs to be listed explicitly
/// rather than matched by prefix against arbitrary remote label text.
pub const ALL_STATUS_LABELS: &[&str] = &[
    LABEL_NEEDS_PLAN,
    LABEL_PLANNING,
    LABEL_READY,
    LABEL_IMPLEMENTING,
    LABEL_REVIEW_REQUESTED,
    LABEL_REVIEWING,
    LABEL_REQUIRES_CHANGES,
    LABEL_LGTM,
];

pub const TRANSITION_RULES: &[LabelTransitionRule] = &[
    LabelTransitionRule { trigger: LABEL_NEEDS_PLAN, execution: Some(LABEL_PLANNING) },
    LabelTransitionRule { trigger: LABEL_READY, execution: Some(LABEL_IMPLEMENTING) },
    LabelTransitionRule { trigger: LABEL_REVIEW_REQUESTED, execution: Some(LABEL_REVIEWING) },
    LabelTransitionRule { trigger: LABEL_REQUIRES_CHANGES, execution: None },
];

/// The phase a trigger label authorizes. `Revise` carries no execution label
/// (see `LabelTransitionRule`); `NoOp` is the dispatcher's defensive default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Implement,
    Review,
    Revise,
    NoOp,
}

impl LabelTransitionRule {
    pub fn phase(&self) -> Phase {
        match self.trigger {
            LABEL_NEEDS_PLAN => Phase::Plan,
            LABEL_READY => Phase::Implement,
            LABEL_REVIEW_REQUESTED => Phase::Review,
            LABEL_REQUIRES_CHANGES => Phase::Revise,
            _ => Phase::NoOp,
        }
    }

    /// Where a transition lands: the execution label, or (for revise)
    /// directly back to `status:ready`.
    pub fn target(&self) -> &'static str {
        self.execution.unwrap_or(LABEL_READY)
    }
}

// ── Remote entities ───────────────────────────────────────────────────────

/// A GitHub issue as observed on one poll. Immutable per observation; the
/// watcher re-observes on the next cycle rather than mutating this in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: Option<String>,
    pub labels: Vec<String>,
}

impl Issue {
    pub fn new(number: u64, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { number, title: None, labels: labels.into_iter().map(Into::into).collect() }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// True if any label starts with `status:` — used by the auto-plan
    /// elector to determine whether a pipeline label family is already
    /// active on this issue.
    pub fn has_any_status_label(&self) -> bool {
        self.labels.iter().any(|l| l.starts_with(STATUS_PREFIX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mergeable {
    Mergeable,
    Conflicting,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: PrState,
    pub mergeable: Mergeable,
    pub is_draft: bool,
    pub checks_status: String,
    pub head_ref: String,
    pub labels: Vec<String>,
}

impl PullRequest {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

// ── Events ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IssueDetected,
    LabelAdded,
    LabelRemoved,
    LabelChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub issue_id: u64,
    pub issue_title: Option<String>,
    pub owner: String,
    pub repo: String,
    pub from_label: Option<String>,
    pub to_label: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ── Health ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub reason: String,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

// ── Auto-merge metrics ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoMergeMetrics {
    pub total_attempts: u64,
    pub successful_merges: u64,
    pub failed_merges: u64,
    pub failure_reasons: std::collections::HashMap<String, u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl AutoMergeMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_merges as f64 / self.total_attempts as f64
        }
    }

    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.total_attempts += 1;
        self.last_attempt_at = Some(now);
    }

    pub fn record_success(&mut self) {
        self.successful_merges += 1;
    }

    pub fn record_failure(&mut self, reason: &str) {
        self.failed_merges += 1;
        *self.failure_reasons.entry(reason.to_string()).or_insert(0) += 1;
    }
}
