pub mod action;
pub mod autoplan;
pub mod client;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod health;
pub mod issue_watcher;
pub mod mock;
pub mod notifier;
pub mod pr_watcher;
pub mod retry;
pub mod transition;
pub mod types;

pub use client::{ClientError, GitHubClient, RateLimits};
pub use config::Config;
pub use issue_watcher::{IssueWatcher, IssueWatcherConfig};
pub use notifier::Notifier;
pub use pr_watcher::{PrWatcher, PrWatcherConfig};
pub use types::{Issue, OrbitEvent, Phase, PullRequest};
