use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};

/// Full application configuration, loaded from environment variables (with a
/// `.env` fallback file) under the `OSOBA_` prefix.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_owner: String,
    pub github_repo: String,
    pub github_token: String,
    pub poll_interval: Duration,
    pub pr_poll_interval: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub labels: Vec<String>,
    pub auto_merge_lgtm: bool,
    pub auto_revise_pr: bool,
    pub auto_plan_issue: bool,

    // Ambient settings required to run but outside the core watcher
    // options: token for the real client, health-surface bind address,
    // the coding-agent CLI to launch for phase actions.
    pub web_bind: String,
    pub web_port: u16,
    pub agent_bin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_owner: String::new(),
            github_repo: String::new(),
            github_token: String::new(),
            poll_interval: Duration::from_secs(5),
            pr_poll_interval: Duration::from_secs(20),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            labels: vec![
                crate::types::LABEL_NEEDS_PLAN.to_string(),
                crate::types::LABEL_READY.to_string(),
                crate::types::LABEL_REVIEW_REQUESTED.to_string(),
                crate::types::LABEL_REQUIRES_CHANGES.to_string(),
            ],
            auto_merge_lgtm: false,
            auto_revise_pr: false,
            auto_plan_issue: false,
            web_bind: "127.0.0.1".to_string(),
            web_port: 8787,
            agent_bin: "claude".to_string(),
        }
    }
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_bool(key: &str, dotenv: &HashMap<String, String>, default: bool) -> bool {
    match get(key, dotenv).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn get_u32(key: &str, dotenv: &HashMap<String, String>, default: u32) -> u32 {
    get(key, dotenv).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_u16(key: &str, dotenv: &HashMap<String, String>, default: u16) -> u16 {
    get(key, dotenv).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_secs(key: &str, dotenv: &HashMap<String, String>, default: Duration) -> Duration {
    get(key, dotenv)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Config {
    /// Load from the environment (`OSOBA_*`), falling back to a `.env` file,
    /// then to the documented defaults. Validates the constraints watcher
    /// construction places on these values (non-empty owner/repo/labels,
    /// poll interval >= 1s).
    pub fn from_env() -> Result<Self> {
        let dotenv = parse_dotenv();
        let mut cfg = Self::default();

        cfg.github_owner = get_str("OSOBA_GITHUB_OWNER", &dotenv, &cfg.github_owner);
        cfg.github_repo = get_str("OSOBA_GITHUB_REPO", &dotenv, &cfg.github_repo);
        cfg.github_token = get_str("OSOBA_GITHUB_TOKEN", &dotenv, &cfg.github_token);
        cfg.poll_interval = get_secs("OSOBA_GITHUB_POLL_INTERVAL", &dotenv, cfg.poll_interval);
        cfg.pr_poll_interval = get_secs("OSOBA_GITHUB_PR_POLL_INTERVAL", &dotenv, cfg.pr_poll_interval);
        cfg.max_retries = get_u32("OSOBA_GITHUB_MAX_RETRIES", &dotenv, cfg.max_retries);
        cfg.retry_base_delay = get_secs("OSOBA_GITHUB_RETRY_BASE_DELAY", &dotenv, cfg.retry_base_delay);
        cfg.auto_merge_lgtm = get_bool("OSOBA_GITHUB_AUTO_MERGE_LGTM", &dotenv, cfg.auto_merge_lgtm);
        cfg.auto_revise_pr = get_bool("OSOBA_GITHUB_AUTO_REVISE_PR", &dotenv, cfg.auto_revise_pr);
        cfg.auto_plan_issue = get_bool("OSOBA_GITHUB_AUTO_PLAN_ISSUE", &dotenv, cfg.auto_plan_issue);
        cfg.web_bind = get_str("OSOBA_WEB_BIND", &dotenv, &cfg.web_bind);
        cfg.web_port = get_u16("OSOBA_WEB_PORT", &dotenv, cfg.web_port);
        cfg.agent_bin = get_str("OSOBA_AGENT_BIN", &dotenv, &cfg.agent_bin);

        if let Some(raw) = get("OSOBA_GITHUB_LABELS", &dotenv) {
            let labels: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !labels.is_empty() {
                cfg.labels = labels;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.github_owner.is_empty() {
            bail!("github.owner must not be empty");
        }
        if self.github_repo.is_empty() {
            bail!("github.repo must not be empty");
        }
        if self.labels.is_empty() {
            bail!("github.labels must not be empty");
        }
        if self.poll_interval < Duration::from_secs(1) {
            bail!("github.poll_interval must be >= 1s");
        }
        if self.pr_poll_interval < Duration::from_secs(1) {
            bail!("github.pr_poll_interval must be >= 1s");
        }
        if self.max_retries < 1 {
            bail!("github.max_retries must be >= 1");
        }
        if self.retry_base_delay.is_zero() {
            bail!("github.retry_base_delay must be > 0");
        }
        Ok(())
    }
}
