//! Agent invocation seam.
//!
//! The [`AgentRunner`] trait decouples the executor and scheduler from the
//! actual agent CLI. Tests use scripted runners that return predetermined
//! output without spawning processes.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::core::engine::Engine;
use crate::io::process::run_argv;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub engine: Engine,
    pub prompt: String,
    /// Working directory for the agent process (the repo or a worktree).
    pub cwd: PathBuf,
    /// Caller environment overrides, applied over the engine's own env.
    pub env: Vec<(String, String)>,
    /// Where codex should write its final answer.
    pub last_message_path: Option<PathBuf>,
}

impl AgentRequest {
    pub fn new(engine: Engine, prompt: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            prompt: prompt.into(),
            cwd: cwd.into(),
            env: Vec::new(),
            last_message_path: None,
        }
    }
}

/// Raw result of one agent invocation, unclassified.
#[derive(Debug, Clone, Default)]
pub struct AgentInvocation {
    /// The command line that was (or would be) run, for diagnostics.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Abstraction over agent execution backends.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentInvocation>;
}

/// Runner that spawns the engine's real CLI binary.
pub struct CliAgentRunner;

#[async_trait]
impl AgentRunner for CliAgentRunner {
    #[instrument(skip_all, fields(engine = request.engine.as_str()))]
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentInvocation> {
        let binary = request.engine.binary();
        let args = request
            .engine
            .args(&request.prompt, request.last_message_path.as_deref());

        let mut env = request.engine.env();
        env.extend(request.env.iter().cloned());

        info!(cwd = %request.cwd.display(), "invoking agent");
        let output = run_argv(binary, &args, Some(&request.cwd), &env).await?;
        debug!(exit_code = ?output.exit_code, "agent finished");

        Ok(AgentInvocation {
            command: format!("{binary} {}", args.join(" ")),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
        })
    }
}
