use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

const MAX_INACTIVITY: Duration = Duration::from_secs(10 * 60);

/// Aggregate health of both watchers. 200 when both report healthy, 503
/// otherwise, with the per-watcher breakdown in the body either way.
pub async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let issue_health = state.issue_watcher.health_report(MAX_INACTIVITY).await;
    let pr_health = state.pr_watcher.health_report(MAX_INACTIVITY).await;

    let status = if issue_health.healthy && pr_health.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status, Json(json!({ "issue_watcher": issue_health, "pr_watcher": pr_health })))
}

/// Snapshot of auto-merge metrics for both watchers, plus the issue
/// watcher's last auto-plan election time, if any.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let issue_metrics = state.issue_watcher.merge_metrics().await;
    let pr_metrics = state.pr_watcher.merge_metrics().await;
    let last_election = state.issue_watcher.auto_plan_last_election().await;

    Json(json!({
        "issue_watcher_auto_merge": issue_metrics,
        "pr_watcher_auto_merge": pr_metrics,
        "auto_plan_last_election": last_election,
    }))
}
