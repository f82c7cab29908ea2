//! AI-assisted merge-conflict resolution.
//!
//! One agent invocation gets the list of conflicted files and is asked to
//! resolve them, `git add`, and commit. If conflicts remain afterwards the
//! merge is aborted and the caller gets a merge error.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::engine::Engine;
use crate::io::agent::{AgentRequest, AgentRunner};
use crate::io::git::Git;
use crate::io::prompt::build_merge_prompt;

/// Resolve the current merge's conflicts with one agent invocation.
///
/// Finalizes the merge commit if the agent left it open; aborts the merge and
/// errors if any conflict survives.
#[instrument(skip_all, fields(cwd = %cwd.display()))]
pub async fn resolve_conflicts(
    cwd: &Path,
    engine: Engine,
    agent: &dyn AgentRunner,
) -> Result<()> {
    let git = Git::new(cwd);
    let conflicted = git.conflicted_files().await?;
    if conflicted.is_empty() {
        return Ok(());
    }
    info!(files = conflicted.len(), "asking agent to resolve merge conflicts");

    let request = AgentRequest::new(engine, build_merge_prompt(&conflicted), cwd);
    // Single attempt; a merge that the agent cannot fix is aborted, not retried.
    let _ = agent.invoke(&request).await;

    let remaining = git.conflicted_files().await?;
    if remaining.is_empty() {
        if git.merge_in_progress().await? {
            git.commit_no_edit().await?;
        }
        return Ok(());
    }

    warn!(files = remaining.len(), "conflicts remain, aborting merge");
    if let Err(err) = git.merge_abort().await {
        warn!(%err, "merge abort failed");
    }
    Err(anyhow!("Merge conflict could not be resolved automatically"))
}
