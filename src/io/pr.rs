//! Pull-request creation via `gh pr create`.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::io::process::run_argv;

/// One PR to open after a task completes.
#[derive(Debug, Clone)]
pub struct PrRequest {
    pub title: String,
    pub body: String,
    /// Passed through exactly as generated, unsanitized.
    pub head_branch: String,
    pub base_branch: String,
    pub draft: bool,
    pub cwd: PathBuf,
}

/// Seam for PR creation; production shells out to `gh`.
#[async_trait]
pub trait PrCreator: Send + Sync {
    /// Returns the created PR's URL.
    async fn create(&self, request: &PrRequest) -> Result<String>;
}

pub struct GhPrCreator;

#[async_trait]
impl PrCreator for GhPrCreator {
    #[instrument(skip_all, fields(head = %request.head_branch))]
    async fn create(&self, request: &PrRequest) -> Result<String> {
        let mut args: Vec<String> = vec![
            "pr".into(),
            "create".into(),
            "--title".into(),
            request.title.clone(),
            "--body".into(),
            request.body.clone(),
            "--head".into(),
            request.head_branch.clone(),
            "--base".into(),
            request.base_branch.clone(),
        ];
        if request.draft {
            args.push("--draft".into());
        }

        let out = run_argv("gh", &args, Some(&request.cwd), &[]).await?;
        if !out.success() {
            return Err(anyhow!("gh pr create failed: {}", out.error_message("gh")));
        }
        let url = out.stdout.trim().to_string();
        info!(url = %url, "created pull request");
        Ok(url)
    }
}
