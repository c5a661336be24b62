use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::types::HealthReport;

#[derive(Debug, Default)]
struct Counters {
    total_executions: u64,
    successful_executions: u64,
    failed_executions: u64,
    last_execution: Option<DateTime<Utc>>,
}

/// Owns a watcher's execution counters behind a lock. Shared by both the
/// issue and PR watcher since their health semantics are identical.
#[derive(Debug, Default)]
pub struct Health {
    counters: Mutex<Counters>,
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_start(&self, now: DateTime<Utc>) {
        let mut c = self.counters.lock().await;
        c.total_executions += 1;
        c.last_execution = Some(now);
    }

    pub async fn record_success(&self) {
        self.counters.lock().await.successful_executions += 1;
    }

    pub async fn record_failure(&self) {
        self.counters.lock().await.failed_executions += 1;
    }

    /// Never executed is unhealthy; inactive past `max_inactivity` is
    /// unhealthy; a success rate below 10% after more than 10 executions
    /// is unhealthy; otherwise healthy.
    pub async fn check_health(&self, max_inactivity: Duration, now: DateTime<Utc>) -> HealthReport {
        let c = self.counters.lock().await;

        let Some(last) = c.last_execution else {
            return HealthReport {
                healthy: false,
                reason: "never been executed".to_string(),
                total_executions: 0,
                successful_executions: 0,
                failed_executions: 0,
                success_rate: 0.0,
                last_execution: None,
            };
        };

        let success_rate = if c.total_executions == 0 {
            0.0
        } else {
            c.successful_executions as f64 / c.total_executions as f64
        };

        let since_last = (now - last).to_std().unwrap_or(Duration::ZERO);
        if since_last > max_inactivity {
            return HealthReport {
                healthy: false,
                reason: format!(
                    "inactive for {}s (threshold: {}s)",
                    since_last.as_secs(),
                    max_inactivity.as_secs()
                ),
                total_executions: c.total_executions,
                successful_executions: c.successful_executions,
                failed_executions: c.failed_executions,
                success_rate,
                last_execution: Some(last),
            };
        }

        if c.total_executions > 10 && success_rate < 0.10 {
            return HealthReport {
                healthy: false,
                reason: format!("success rate {:.1}% below threshold", success_rate * 100.0),
                total_executions: c.total_executions,
                successful_executions: c.successful_executions,
                failed_executions: c.failed_executions,
                success_rate,
                last_execution: Some(last),
            };
        }

        HealthReport {
            healthy: true,
            reason: format!(
                "success rate {:.1}%, last execution {}s ago",
                success_rate * 100.0,
                since_last.as_secs()
            ),
            total_executions: c.total_executions,
            successful_executions: c.successful_executions,
            failed_executions: c.failed_executions,
            success_rate,
            last_execution: Some(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_executed_is_unhealthy() {
        let health = Health::new();
        let report = health.check_health(Duration::from_secs(60), Utc::now()).await;
        assert!(!report.healthy);
        assert_eq!(report.reason, "never been executed");
    }

    #[tokio::test]
    async fn healthy_after_successful_runs() {
        let health = Health::new();
        let now = Utc::now();
        health.record_start(now).await;
        health.record_success().await;
        let report = health.check_health(Duration::from_secs(60), now).await;
        assert!(report.healthy);
        assert_eq!(report.success_rate, 1.0);
    }

    #[tokio::test]
    async fn inactive_past_threshold_is_unhealthy() {
        let health = Health::new();
        let start = Utc::now();
        health.record_start(start).await;
        health.record_success().await;
        let later = start + chrono::Duration::seconds(120);
        let report = health.check_health(Duration::from_secs(60), later).await;
        assert!(!report.healthy);
        assert!(report.reason.starts_with("inactive for"));
    }

    #[tokio::test]
    async fn low_success_rate_after_many_executions_is_unhealthy() {
        let health = Health::new();
        let now = Utc::now();
        for _ in 0..11 {
            health.record_start(now).await;
            health.record_failure().await;
        }
        let report = health.check_health(Duration::from_secs(3600), now).await;
        assert!(!report.healthy);
        assert!(report.reason.contains("success rate"));
    }
}
