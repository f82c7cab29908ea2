//! Issue-tracker backlog via the `gh` CLI.
//!
//! All tracker access goes through the [`IssueRunner`] seam; production uses
//! [`GhCli`], tests use scripted runners with canned JSON.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::task::{CompleteOutcome, SourceKind, Task};
use crate::io::process::{ProcessOutput, run_argv};

/// Runs `gh` (or a stand-in) with the given arguments.
#[async_trait]
pub trait IssueRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<ProcessOutput>;
}

/// Production runner spawning the `gh` binary.
pub struct GhCli {
    cwd: PathBuf,
}

impl GhCli {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

#[async_trait]
impl IssueRunner for GhCli {
    async fn run(&self, args: &[String]) -> Result<ProcessOutput> {
        run_argv("gh", args, Some(&self.cwd), &[]).await
    }
}

#[derive(Debug, Clone, Deserialize)]
struct IssueListing {
    number: u64,
    title: String,
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IssueState {
    state: String,
}

/// Issue-backed task source: open issues are incomplete tasks; completing a
/// task closes its issue.
pub struct GithubIssues {
    repo: Option<String>,
    label: Option<String>,
    runner: std::sync::Arc<dyn IssueRunner>,
}

impl GithubIssues {
    pub fn new(
        repo: Option<String>,
        label: Option<String>,
        runner: std::sync::Arc<dyn IssueRunner>,
    ) -> Self {
        Self { repo, label, runner }
    }

    /// First open issue, as a task.
    #[instrument(skip_all)]
    pub async fn next(&self) -> Result<Option<Task>> {
        let issues = self.list("open").await?;
        debug!(count = issues.len(), "listed open issues");
        Ok(issues.into_iter().next().map(|issue| Task {
            source: SourceKind::Github,
            text: issue.title,
            line: None,
            url: issue.url,
            number: Some(issue.number),
            group: None,
            completed: false,
        }))
    }

    /// Close the issue whose trimmed title matches `title` exactly.
    #[instrument(skip_all)]
    pub async fn complete(&self, title: &str) -> Result<CompleteOutcome> {
        let wanted = title.trim();
        let issues = self.list("all").await?;
        let Some(issue) = issues.iter().find(|issue| issue.title.trim() == wanted) else {
            return Ok(CompleteOutcome::NotFound);
        };

        let number = issue.number.to_string();
        let view = self
            .run_checked(&["issue", "view", &number, "--json", "state"])
            .await?;
        let state: IssueState =
            serde_json::from_str(view.stdout.trim()).context("parse issue state")?;

        if state.state.eq_ignore_ascii_case("closed") {
            return Ok(CompleteOutcome::AlreadyComplete);
        }
        self.run_checked(&["issue", "close", &number]).await?;
        Ok(CompleteOutcome::Updated)
    }

    async fn list(&self, state: &str) -> Result<Vec<IssueListing>> {
        let mut args = vec![
            "issue",
            "list",
            "--state",
            state,
            "--json",
            "number,title,url",
        ];
        if let Some(label) = &self.label {
            args.push("--label");
            args.push(label);
        }
        if let Some(repo) = &self.repo {
            args.push("--repo");
            args.push(repo);
        }
        let out = self.run_checked(&args).await?;
        serde_json::from_str(out.stdout.trim()).context("parse issue listing")
    }

    async fn run_checked(&self, args: &[&str]) -> Result<ProcessOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let out = self.runner.run(&args).await?;
        if !out.success() {
            return Err(anyhow!(
                "gh {} failed: {}",
                args.join(" "),
                out.error_message("gh")
            ));
        }
        Ok(out)
    }
}
