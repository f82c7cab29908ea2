//! Single-task execution with bounded retries.
//!
//! One call builds the prompt, invokes the agent up to `max_retries` times
//! with a fixed delay between attempts (no backoff), parses each attempt's
//! output, and classifies the result. A dry run returns the prompt without
//! touching anything.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::{Duration, sleep};
use tracing::{debug, instrument, warn};

use crate::core::engine::Engine;
use crate::core::parser::{AgentReply, parse_agent_output};
use crate::core::task::SourceKind;
use crate::core::usage::Usage;
use crate::io::agent::{AgentInvocation, AgentRequest, AgentRunner};
use crate::io::config::load_config;
use crate::io::prompt::{PromptInputs, build_task_prompt};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Options for executing one task.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub engine: Engine,
    /// Working directory: the repository, or a worktree in parallel mode.
    pub cwd: PathBuf,
    pub skip_tests: bool,
    pub skip_lint: bool,
    pub auto_commit: bool,
    pub dry_run: bool,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub prompt_mode: Option<String>,
    pub task_source: Option<SourceKind>,
    pub issue_body: Option<String>,
}

impl ExecOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            engine: Engine::default(),
            cwd: cwd.into(),
            skip_tests: false,
            skip_lint: false,
            auto_commit: true,
            dry_run: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            prompt_mode: None,
            task_source: None,
            issue_body: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecSuccess {
    pub engine: Engine,
    pub attempts: u32,
    pub response: String,
    pub usage: Usage,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecFailure {
    pub engine: Engine,
    pub attempts: u32,
    pub error: String,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRun {
    pub engine: Engine,
    pub prompt: String,
}

/// Exactly one of ok / error / dry-run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ExecOutcome {
    Ok(ExecSuccess),
    Error(ExecFailure),
    DryRun(DryRun),
}

/// Execute one task through the agent.
#[instrument(skip_all, fields(engine = options.engine.as_str(), dry_run = options.dry_run))]
pub async fn execute_task(
    task_text: &str,
    options: &ExecOptions,
    agent: &dyn AgentRunner,
) -> Result<ExecOutcome> {
    let config = load_config(&options.cwd)?;
    let prompt = build_task_prompt(&PromptInputs {
        task_text: task_text.to_string(),
        config,
        skip_tests: options.skip_tests,
        skip_lint: options.skip_lint,
        auto_commit: options.auto_commit,
        prompt_mode: options.prompt_mode.clone(),
        task_source: options.task_source,
        issue_body: options.issue_body.clone(),
    })?;

    if options.dry_run {
        return Ok(ExecOutcome::DryRun(DryRun {
            engine: options.engine,
            prompt,
        }));
    }

    let max_retries = options.max_retries.max(1);
    let mut attempts = 0u32;
    let mut last: Option<(AgentInvocation, String)> = None;

    while attempts < max_retries {
        attempts += 1;
        debug!(attempt = attempts, "invoking agent");

        // Codex writes its final answer to a file; give each attempt a fresh
        // scratch directory and drop it whatever happens.
        let scratch = match options.engine {
            Engine::Codex => Some(tempfile::tempdir().context("create codex scratch dir")?),
            _ => None,
        };
        let last_message_path = scratch
            .as_ref()
            .map(|dir| dir.path().join("last-message.txt"));

        let request = AgentRequest {
            engine: options.engine,
            prompt: prompt.clone(),
            cwd: options.cwd.clone(),
            env: Vec::new(),
            last_message_path: last_message_path.clone(),
        };

        let (invocation, reply) = match agent.invoke(&request).await {
            Ok(invocation) => {
                let last_message = last_message_path
                    .as_deref()
                    .and_then(|path| std::fs::read_to_string(path).ok());
                let reply = parse_agent_output(
                    options.engine,
                    &invocation.stdout,
                    last_message.as_deref(),
                );
                (invocation, reply)
            }
            Err(err) => (
                AgentInvocation::default(),
                AgentReply {
                    error: Some(err.to_string()),
                    ..AgentReply::default()
                },
            ),
        };
        drop(scratch);

        match classify(&invocation, &reply) {
            None => {
                return Ok(ExecOutcome::Ok(ExecSuccess {
                    engine: options.engine,
                    attempts,
                    response: reply.response,
                    usage: reply.usage,
                    stdout: invocation.stdout,
                    stderr: invocation.stderr,
                    exit_code: invocation.exit_code,
                }));
            }
            Some(error) => {
                warn!(attempt = attempts, %error, "agent attempt failed");
                last = Some((invocation, error));
                if attempts < max_retries {
                    sleep(Duration::from_secs(options.retry_delay_secs)).await;
                }
            }
        }
    }

    let (invocation, error) = last.unwrap_or_else(|| {
        (
            AgentInvocation::default(),
            "Agent was never invoked".to_string(),
        )
    });
    Ok(ExecOutcome::Error(ExecFailure {
        engine: options.engine,
        attempts,
        error,
        stdout: invocation.stdout,
        stderr: invocation.stderr,
        exit_code: invocation.exit_code,
    }))
}

/// Success is: no agent-reported error, exit code zero, non-empty response.
fn classify(invocation: &AgentInvocation, reply: &AgentReply) -> Option<String> {
    if let Some(error) = &reply.error {
        return Some(error.clone());
    }
    if invocation.exit_code != Some(0) {
        let code = match invocation.exit_code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        };
        return Some(format!("Agent exited with code {code}"));
    }
    if reply.response.is_empty() {
        return Some("Empty response from agent".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAgent, ScriptedReply, result_line};

    fn options(dir: &std::path::Path) -> ExecOptions {
        ExecOptions {
            retry_delay_secs: 0,
            ..ExecOptions::new(dir)
        }
    }

    #[tokio::test]
    async fn dry_run_builds_prompt_without_invoking() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ScriptedAgent::new(Vec::new());
        let outcome = execute_task(
            "Add a feature",
            &ExecOptions {
                dry_run: true,
                ..options(temp.path())
            },
            &agent,
        )
        .await
        .expect("execute");

        let ExecOutcome::DryRun(dry) = outcome else {
            panic!("expected dry run");
        };
        assert!(dry.prompt.contains("Add a feature"));
        assert_eq!(agent.invocations(), 0);
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ScriptedAgent::new(vec![ScriptedReply::ok(&result_line("All done", 3, 4))]);
        let outcome = execute_task("Task", &options(temp.path()), &agent)
            .await
            .expect("execute");

        let ExecOutcome::Ok(success) = outcome else {
            panic!("expected success");
        };
        assert_eq!(success.attempts, 1);
        assert_eq!(success.response, "All done");
        assert_eq!(success.usage.input_tokens, 3);
        assert_eq!(success.usage.output_tokens, 4);
    }

    #[tokio::test]
    async fn retries_then_reports_last_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ScriptedAgent::new(vec![
            ScriptedReply::exit(1, "", "first boom"),
            ScriptedReply::exit(2, "", "second boom"),
        ]);
        let outcome = execute_task(
            "Task",
            &ExecOptions {
                max_retries: 2,
                ..options(temp.path())
            },
            &agent,
        )
        .await
        .expect("execute");

        let ExecOutcome::Error(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.error, "Agent exited with code 2");
        assert_eq!(failure.stderr, "second boom");
        assert_eq!(agent.invocations(), 2);
    }

    #[tokio::test]
    async fn empty_response_is_a_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ScriptedAgent::new(vec![ScriptedReply::ok("")]);
        let outcome = execute_task(
            "Task",
            &ExecOptions {
                max_retries: 1,
                ..options(temp.path())
            },
            &agent,
        )
        .await
        .expect("execute");

        let ExecOutcome::Error(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.error, "Empty response from agent");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = ExecOutcome::DryRun(DryRun {
            engine: Engine::Claude,
            prompt: "p".to_string(),
        });
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["status"], "dry-run");
        assert_eq!(json["engine"], "claude");
    }
}
