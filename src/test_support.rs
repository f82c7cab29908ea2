//! Test-only helpers: throwaway git repositories and scripted subprocess
//! seams that return predetermined output without spawning agents.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::io::agent::{AgentInvocation, AgentRequest, AgentRunner};
use crate::io::gh::IssueRunner;
use crate::io::pr::{PrCreator, PrRequest};
use crate::io::process::ProcessOutput;

/// A real git repository in a tempdir, with an initial commit on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "-b", "main"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "Test User"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        std::fs::write(repo.root().join(".gitignore"), ".ralphy/\n")
            .context("write .gitignore")?;
        std::fs::write(repo.root().join("README.md"), "# fixture\n").context("write README")?;
        repo.git(&["add", "-A"])?;
        repo.git(&["commit", "-m", "initial commit"])?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the repo root, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent directories");
        }
        std::fs::write(path, contents).expect("write file");
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).expect("read file")
    }

    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "-A"]).expect("git add");
        self.git(&["commit", "-m", message]).expect("git commit");
    }

    pub fn current_branch(&self) -> String {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .expect("git rev-parse")
            .trim()
            .to_string()
    }

    /// Run git in the repo, returning stdout; errors on non-zero exit.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.root())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

type Effect = Box<dyn Fn(&AgentRequest) + Send + Sync>;

/// One queued agent reply, with an optional side effect run at invocation
/// time (writing files in the request's cwd, committing, …).
pub struct ScriptedReply {
    pub invocation: AgentInvocation,
    pub delay_ms: u64,
    pub effect: Option<Effect>,
}

impl ScriptedReply {
    /// Successful invocation with the given stdout.
    pub fn ok(stdout: &str) -> Self {
        Self {
            invocation: AgentInvocation {
                command: "scripted".to_string(),
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
            delay_ms: 0,
            effect: None,
        }
    }

    /// Invocation ending with the given exit code.
    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            invocation: AgentInvocation {
                command: "scripted".to_string(),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code: Some(code),
            },
            delay_ms: 0,
            effect: None,
        }
    }

    /// Successful codex invocation: writes `message` to the request's
    /// last-message path.
    pub fn codex_ok(message: &str) -> Self {
        let message = message.to_string();
        Self::ok("").with_effect(move |request: &AgentRequest| {
            let path = request
                .last_message_path
                .as_ref()
                .expect("codex request should carry a last-message path");
            std::fs::write(path, &message).expect("write last message");
        })
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_effect(mut self, effect: impl Fn(&AgentRequest) + Send + Sync + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

/// Agent runner that pops queued replies instead of spawning processes.
///
/// Tracks the number of invocations and the maximum number running at once,
/// so scheduler tests can assert concurrency bounds.
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<AgentRequest>>,
    invocations: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            invocations: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running invocations observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentInvocation> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let reply = self.replies.lock().expect("replies lock").pop_front();
        let result = match reply {
            Some(reply) => {
                if reply.delay_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(reply.delay_ms)).await;
                }
                if let Some(effect) = &reply.effect {
                    effect(request);
                }
                Ok(reply.invocation.clone())
            }
            None => Err(anyhow!("no scripted agent reply left")),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// PR creator that records requests; optionally fails every call.
pub struct RecordingPr {
    requests: Mutex<Vec<PrRequest>>,
    fail: bool,
}

impl RecordingPr {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn requests(&self) -> Vec<PrRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Default for RecordingPr {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrCreator for RecordingPr {
    async fn create(&self, request: &PrRequest) -> Result<String> {
        if self.fail {
            return Err(anyhow!("gh pr create failed: scripted failure"));
        }
        let mut requests = self.requests.lock().expect("requests lock");
        requests.push(request.clone());
        Ok(format!("https://example.test/pr/{}", requests.len()))
    }
}

/// Issue runner that pops queued process outputs and records every argv.
pub struct ScriptedIssues {
    replies: Mutex<VecDeque<ProcessOutput>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedIssues {
    pub fn new(replies: Vec<ProcessOutput>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl IssueRunner for ScriptedIssues {
    async fn run(&self, args: &[String]) -> Result<ProcessOutput> {
        self.calls.lock().expect("calls lock").push(args.to_vec());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted gh reply left"))
    }
}

/// A claude-style `result` event line for scripted agent stdout.
pub fn result_line(text: &str, input_tokens: u64, output_tokens: u64) -> String {
    serde_json::json!({
        "type": "result",
        "result": text,
        "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens},
    })
    .to_string()
}
