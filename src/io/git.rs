//! Git adapter.
//!
//! Branch lifecycle, stashing, worktrees, and merges all go through this
//! small explicit wrapper around `git` subprocess calls; failing commands
//! surface `git <args> failed: <stderr>` so callers can report the offending
//! command verbatim.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::{ProcessOutput, run_argv};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub async fn current_branch(&self) -> Result<String> {
        let out = self
            .run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// True when `status --porcelain` reports anything (including untracked).
    pub async fn is_dirty(&self) -> Result<bool> {
        let out = self.run_capture(&["status", "--porcelain"]).await?;
        Ok(!out.trim().is_empty())
    }

    /// All local branch names.
    pub async fn branch_list(&self) -> Result<Vec<String>> {
        let out = self
            .run_capture(&["branch", "--list", "--format=%(refname:short)"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip_all, fields(branch))]
    pub async fn checkout(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch]).await?;
        Ok(())
    }

    /// Create and checkout a new branch from `base`.
    #[instrument(skip_all, fields(branch, base))]
    pub async fn checkout_new(&self, branch: &str, base: &str) -> Result<()> {
        debug!(branch, base, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch, base]).await?;
        Ok(())
    }

    /// Create a branch at `base` without checking it out.
    pub async fn create_branch(&self, branch: &str, base: &str) -> Result<()> {
        self.run_checked(&["branch", branch, base]).await?;
        Ok(())
    }

    pub async fn delete_branch(&self, branch: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_checked(&["branch", flag, branch]).await?;
        Ok(())
    }

    /// Merge `branch` into the current branch without opening an editor.
    #[instrument(skip_all, fields(branch))]
    pub async fn merge_no_edit(&self, branch: &str) -> Result<()> {
        self.run_checked(&["merge", "--no-edit", branch]).await?;
        Ok(())
    }

    pub async fn merge_abort(&self) -> Result<()> {
        self.run_checked(&["merge", "--abort"]).await?;
        Ok(())
    }

    /// True when a merge is in progress (`MERGE_HEAD` resolves).
    pub async fn merge_in_progress(&self) -> Result<bool> {
        let out = self
            .run(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await?;
        Ok(out.success() && !out.stdout.trim().is_empty())
    }

    pub async fn commit_no_edit(&self) -> Result<()> {
        self.run_checked(&["commit", "--no-edit"]).await?;
        Ok(())
    }

    /// Paths with unresolved merge conflicts.
    pub async fn conflicted_files(&self) -> Result<Vec<String>> {
        let out = self
            .run_capture(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Stash tracked and untracked changes with the given message.
    pub async fn stash_push(&self, message: &str) -> Result<()> {
        self.run_checked(&["stash", "push", "-u", "-m", message])
            .await?;
        Ok(())
    }

    /// Ref of the most recent stash entry, if any.
    pub async fn latest_stash_ref(&self) -> Result<Option<String>> {
        let out = self
            .run_capture(&["stash", "list", "--format=%gd", "-n", "1"])
            .await?;
        let stash = out.trim();
        Ok((!stash.is_empty()).then(|| stash.to_string()))
    }

    pub async fn stash_pop(&self, stash_ref: &str) -> Result<()> {
        self.run_checked(&["stash", "pop", stash_ref]).await?;
        Ok(())
    }

    /// Add a worktree at `path` on a new branch created from `base`.
    #[instrument(skip_all, fields(branch, path = %path.display()))]
    pub async fn worktree_add(&self, branch: &str, path: &Path, base: &str) -> Result<()> {
        debug!(branch, base, "adding worktree");
        let path = path.display().to_string();
        self.run_checked(&["worktree", "add", "-b", branch, &path, base])
            .await?;
        Ok(())
    }

    pub async fn worktree_remove(&self, path: &Path) -> Result<()> {
        let path = path.display().to_string();
        self.run_checked(&["worktree", "remove", "--force", &path])
            .await?;
        Ok(())
    }

    async fn run_capture(&self, args: &[&str]) -> Result<String> {
        let out = self.run_checked(args).await?;
        Ok(out.stdout)
    }

    async fn run_checked(&self, args: &[&str]) -> Result<ProcessOutput> {
        let out = self.run(args).await?;
        if !out.success() {
            let stderr = out.stderr.trim();
            let detail = if stderr.is_empty() {
                out.stdout.trim()
            } else {
                stderr
            };
            return Err(anyhow!("git {} failed: {}", args.join(" "), detail));
        }
        Ok(out)
    }

    async fn run(&self, args: &[&str]) -> Result<ProcessOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        run_argv("git", &args, Some(&self.workdir), &[])
            .await
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
