//! Per-task branch lifecycle for sequential runs.
//!
//! Four phases: `prepare` captures the original branch and stashes dirty
//! work, `checkout_for_task` cuts a `ralphy/<slug>` branch off the base,
//! `finish_task` returns to the base, and `cleanup` restores the original
//! branch and pops the stash. Git errors surface to the caller; the manager
//! never retries.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::task::{slug, unique_name};
use crate::io::git::Git;

const STASH_MESSAGE: &str = "ralphy: branch-per-task";

pub struct BranchManager {
    git: Git,
    original_branch: String,
    base_branch: String,
    stash_ref: Option<String>,
}

impl BranchManager {
    /// Capture current state, stash dirty work, and move to the base branch.
    #[instrument(skip_all)]
    pub async fn prepare(git: Git, configured_base: Option<&str>) -> Result<Self> {
        let original_branch = git.current_branch().await?;
        let base_branch = configured_base
            .map(str::to_string)
            .unwrap_or_else(|| original_branch.clone());

        let mut stash_ref = None;
        if git.is_dirty().await? {
            debug!("working tree dirty, stashing");
            git.stash_push(STASH_MESSAGE).await?;
            stash_ref = git.latest_stash_ref().await?;
        }
        if base_branch != original_branch {
            git.checkout(&base_branch).await?;
        }

        Ok(Self {
            git,
            original_branch,
            base_branch,
            stash_ref,
        })
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// Create and checkout a unique `ralphy/<slug>` branch for this task.
    #[instrument(skip_all)]
    pub async fn checkout_for_task(&self, title: &str) -> Result<String> {
        let taken = self.git.branch_list().await?;
        let branch = unique_name(&format!("ralphy/{}", slug(title)), &taken);
        self.git.checkout_new(&branch, &self.base_branch).await?;
        debug!(branch = %branch, "created task branch");
        Ok(branch)
    }

    /// Leave the per-task branch in place and return to the base branch.
    pub async fn finish_task(&self) -> Result<()> {
        self.git.checkout(&self.base_branch).await
    }

    /// Restore the original branch and pop the stash, if one was taken.
    #[instrument(skip_all)]
    pub async fn cleanup(&mut self) -> Result<()> {
        self.git.checkout(&self.original_branch).await?;
        if let Some(stash_ref) = self.stash_ref.take() {
            debug!(stash = %stash_ref, "restoring stashed changes");
            self.git.stash_pop(&stash_ref).await?;
        }
        Ok(())
    }
}
