use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Output collected from one agent invocation: combined stdout/stderr lines
/// and the process's exit status.
pub struct SessionOutput {
    pub lines: Vec<String>,
    pub success: bool,
}

/// Launches the coding-agent CLI (e.g. `claude`) as a subprocess inside a
/// worktree, piping its output line by line. A phase action uses this to
/// drive the plan/implement/review/revise work itself; orbit-core never
/// sees the subprocess.
pub struct AgentSession {
    pub bin: String,
}

impl AgentSession {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Runs the agent with `prompt` inside `working_dir`, collecting output
    /// until exit or `timeout` elapses (whichever first).
    pub async fn run(&self, working_dir: &Path, prompt: &str, timeout: Option<Duration>) -> Result<SessionOutput> {
        let mut child = Command::new(&self.bin)
            .current_dir(working_dir)
            .arg("--print")
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn agent binary '{}'", self.bin))?;

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("agent session: missing stdout pipe"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("agent session: missing stderr pipe"))?;
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let mut collected = Vec::new();
        let collect = async {
            loop {
                tokio::select! {
                    line = stdout_lines.next_line() => match line {
                        Ok(Some(line)) => collected.push(line),
                        Ok(None) => break,
                        Err(err) => { collected.push(format!("[stdout read error: {err}]")); break; }
                    },
                    line = stderr_lines.next_line() => match line {
                        Ok(Some(line)) => collected.push(line),
                        Ok(None) => {}
                        Err(err) => { collected.push(format!("[stderr read error: {err}]")); }
                    },
                }
            }
            collected
        };

        let lines = match timeout {
            Some(duration) => tokio::time::timeout(duration, collect)
                .await
                .map_err(|_| anyhow!("agent session timed out after {:?}", duration))?,
            None => collect.await,
        };

        let status = child.wait().await.with_context(|| "failed to await agent subprocess")?;
        Ok(SessionOutput { lines, success: status.success() })
    }
}
