mod logging;
mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use orbit_actions::{AgentSession, StandardActionFactory, WorktreeManager};
use orbit_core::config::Config;
use orbit_core::issue_watcher::{IssueWatcher, IssueWatcherConfig};
use orbit_core::pr_watcher::{PrWatcher, PrWatcherConfig};
use orbit_core::{GitHubClient, Notifier};
use orbit_github::OctocrabClient;
use tokio::sync::watch;
use tracing::{error, info};

pub struct AppState {
    pub issue_watcher: Arc<IssueWatcher>,
    pub pr_watcher: Arc<PrWatcher>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = Config::from_env()?;

    let client: Arc<dyn GitHubClient> = Arc::new(OctocrabClient::new(config.github_token.clone())?);
    let notifier = Notifier::new(32);

    let worktree = Arc::new(WorktreeManager::new("."));
    let agent = Arc::new(AgentSession::new(config.agent_bin.clone()));
    let factory = Arc::new(StandardActionFactory::new(
        worktree,
        agent,
        client.clone(),
        config.github_owner.clone(),
        config.github_repo.clone(),
        "main",
    ));

    let issue_watcher = IssueWatcher::new(
        IssueWatcherConfig {
            owner: config.github_owner.clone(),
            repo: config.github_repo.clone(),
            labels: config.labels.clone(),
            poll_interval: config.poll_interval,
            auto_merge_lgtm: config.auto_merge_lgtm,
            auto_plan_issue: config.auto_plan_issue,
        },
        client.clone(),
        factory.clone(),
        Some(notifier.clone()),
    )?;

    let pr_watcher = PrWatcher::new(
        PrWatcherConfig {
            owner: config.github_owner.clone(),
            repo: config.github_repo.clone(),
            poll_interval: config.pr_poll_interval,
            auto_merge_lgtm: config.auto_merge_lgtm,
            auto_revise_pr: config.auto_revise_pr,
        },
        client,
        Some(factory),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    {
        let issue_watcher = issue_watcher.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { issue_watcher.run(shutdown_rx).await });
    }
    {
        let pr_watcher = pr_watcher.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { pr_watcher.run(shutdown_rx).await });
    }

    let state = Arc::new(AppState { issue_watcher, pr_watcher });

    let app = Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/metrics", get(routes::metrics))
        .with_state(state);

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "http server exited with an error");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    Ok(())
}
