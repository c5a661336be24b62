use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};

pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Manages isolated working directories for phase actions: one git worktree
/// per issue branch, checked out off the repo's default branch.
pub struct WorktreeManager {
    pub repo_path: String,
}

impl WorktreeManager {
    pub fn new(repo_path: impl Into<String>) -> Self {
        Self { repo_path: repo_path.into() }
    }

    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        let parent = Path::new(&self.repo_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("/tmp"));
        parent.join("worktrees").join(branch)
    }

    fn exec(&self, dir: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .with_context(|| format!("failed to spawn git -C {dir} {}", args.join(" ")))?;
        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(1),
        })
    }

    /// Creates a new worktree on branch `branch` off `base`. Returns the
    /// path so the phase action can cd into it for the agent session.
    pub fn create(&self, branch: &str, base: &str) -> Result<PathBuf> {
        let path = self.worktree_path(branch);
        let path_str = path.to_string_lossy().into_owned();
        let result = self.exec(&self.repo_path, &["worktree", "add", &path_str, "-b", branch, base])?;
        if !result.success() {
            return Err(anyhow!("git worktree add failed for branch={branch} base={base}: {}", result.combined_output()));
        }
        Ok(path)
    }

    pub fn remove(&self, worktree_path: &Path) -> Result<()> {
        let path_str = worktree_path.to_string_lossy().into_owned();
        let result = self.exec(&self.repo_path, &["worktree", "remove", "--force", &path_str])?;
        if !result.success() {
            return Err(anyhow!("git worktree remove failed for {}: {}", path_str, result.combined_output()));
        }
        Ok(())
    }

    pub fn exists(&self, branch: &str) -> bool {
        self.worktree_path(branch).exists()
    }

    pub fn commit_all(&self, worktree_path: &Path, message: &str) -> Result<()> {
        let dir = worktree_path.to_string_lossy().into_owned();
        self.exec(&dir, &["add", "-A"])?;
        let result = self.exec(&dir, &["commit", "-m", message])?;
        if !result.success() && !result.combined_output().contains("nothing to commit") {
            return Err(anyhow!("git commit failed: {}", result.combined_output()));
        }
        Ok(())
    }

    pub fn push_branch(&self, worktree_path: &Path, branch: &str) -> Result<()> {
        let dir = worktree_path.to_string_lossy().into_owned();
        let result = self.exec(&dir, &["push", "-u", "origin", branch])?;
        if !result.success() {
            return Err(anyhow!("git push {branch} failed: {}", result.combined_output()));
        }
        Ok(())
    }
}
