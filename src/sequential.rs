//! PRD sequential loop: requirement pre-check, then next → execute →
//! complete → branch/PR, repeating until the backlog drains, an iteration
//! limit is hit, or a stage fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::engine::Engine;
use crate::core::report::{
    PrdResult, RunOutcome, RunRecord, RunReport, RunStatus, Stage, StageFailure, StopReason,
};
use crate::core::task::{CompleteOutcome, SourceKind, Task};
use crate::core::usage::Usage;
use crate::executor::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, ExecOptions, ExecOutcome, execute_task,
};
use crate::io::agent::{AgentRunner, CliAgentRunner};
use crate::io::branch::BranchManager;
use crate::io::gh::{GhCli, IssueRunner};
use crate::io::git::Git;
use crate::io::pr::{GhPrCreator, PrCreator, PrRequest};
use crate::io::progress::append_progress;
use crate::io::source::{SourceOptions, TaskSource};

/// Options for a PRD run, sequential or parallel.
#[derive(Debug, Clone)]
pub struct PrdOptions {
    pub cwd: PathBuf,
    pub source: SourceOptions,
    pub engine: Engine,
    /// `None` means unbounded; zero returns immediately with no work.
    pub max_iterations: Option<u32>,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub skip_tests: bool,
    pub skip_lint: bool,
    pub auto_commit: bool,
    pub dry_run: bool,
    pub branch_per_task: bool,
    pub base_branch: Option<String>,
    pub create_pr: bool,
    pub draft_pr: bool,
    pub parallel: bool,
    pub max_parallel: Option<u32>,
}

impl PrdOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            source: SourceOptions::default(),
            engine: Engine::default(),
            max_iterations: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            skip_tests: false,
            skip_lint: false,
            auto_commit: true,
            dry_run: false,
            branch_per_task: false,
            base_branch: None,
            create_pr: false,
            draft_pr: false,
            parallel: false,
            max_parallel: None,
        }
    }
}

/// Injectable subprocess seams: every external touchpoint the loops use.
#[derive(Clone)]
pub struct RunDeps {
    pub agent: Arc<dyn AgentRunner>,
    pub pr: Arc<dyn PrCreator>,
    pub issues: Arc<dyn IssueRunner>,
}

impl RunDeps {
    pub fn production(cwd: &Path) -> Self {
        Self {
            agent: Arc::new(CliAgentRunner),
            pr: Arc::new(GhPrCreator),
            issues: Arc::new(GhCli::new(cwd)),
        }
    }
}

/// Run a PRD backlog to completion (or failure).
#[instrument(skip_all, fields(parallel = options.parallel))]
pub async fn run_prd(options: &PrdOptions, deps: &RunDeps) -> Result<PrdResult> {
    let source = TaskSource::select(&options.cwd, &options.source, deps.issues.clone());

    let failures = check_requirements(&options.cwd, &source);
    if !failures.is_empty() {
        return Ok(PrdResult::Preflight(failures));
    }

    if options.parallel {
        return crate::parallel::run_parallel(options, deps, source).await;
    }
    run_sequential(options, deps, source).await
}

/// Pre-flight requirements, reported structurally rather than thrown.
fn check_requirements(cwd: &Path, source: &TaskSource) -> Vec<String> {
    let mut failures = Vec::new();
    if !cwd.join(".git").exists() {
        failures.push("not a git repository (missing .git)".to_string());
    }
    if let Some(path) = source.path()
        && !path.exists()
    {
        failures.push(format!("task source not found: {}", path.display()));
    }
    if let Some(failure) = manifest_artifact_check(cwd) {
        failures.push(failure);
    }
    failures
}

/// Project-manifest-implies-install-artifact hook.
///
/// Currently node-specific: a `package.json` declaring dependencies requires
/// `node_modules` to exist. Swap this function to support other ecosystems.
fn manifest_artifact_check(cwd: &Path) -> Option<String> {
    let manifest = cwd.join("package.json");
    let contents = std::fs::read_to_string(manifest).ok()?;
    let json: serde_json::Value = serde_json::from_str(&contents).ok()?;
    let has_dependencies = ["dependencies", "devDependencies"].iter().any(|key| {
        json.get(key)
            .and_then(|value| value.as_object())
            .is_some_and(|map| !map.is_empty())
    });
    (has_dependencies && !cwd.join("node_modules").exists()).then(|| {
        "package.json declares dependencies but node_modules is missing (install first)"
            .to_string()
    })
}

async fn run_sequential(
    options: &PrdOptions,
    deps: &RunDeps,
    source: TaskSource,
) -> Result<PrdResult> {
    if options.max_iterations == Some(0) {
        return Ok(PrdResult::Report(RunReport::stopped(
            StopReason::MaxIterations,
        )));
    }

    let mut branch_manager = match options.branch_per_task {
        true => Some(
            BranchManager::prepare(Git::new(&options.cwd), options.base_branch.as_deref()).await?,
        ),
        false => None,
    };

    let report = sequential_loop(options, deps, &source, branch_manager.as_ref()).await;

    // Restore the original branch and stash on every exit path.
    if let Some(manager) = branch_manager.as_mut() {
        if let Err(err) = manager.cleanup().await {
            warn!(%err, "branch cleanup failed");
        }
    }

    Ok(PrdResult::Report(report))
}

async fn sequential_loop(
    options: &PrdOptions,
    deps: &RunDeps,
    source: &TaskSource,
    branch_manager: Option<&BranchManager>,
) -> RunReport {
    let mut iterations = 0u32;
    let mut completed = 0u32;
    let mut tasks: Vec<RunRecord> = Vec::new();
    let mut usage = Usage::default();

    let outcome = loop {
        if let Some(limit) = options.max_iterations
            && iterations >= limit
        {
            break RunOutcome::Ok {
                stopped: StopReason::MaxIterations,
            };
        }

        let task = match source.next().await {
            Ok(Some(task)) => task,
            Ok(None) => {
                break RunOutcome::Ok {
                    stopped: StopReason::NoTasks,
                };
            }
            Err(err) => {
                break fail(Stage::TaskSource, err.to_string(), None);
            }
        };
        iterations += 1;
        info!(task = %task.title(), iteration = iterations, "executing task");

        let task_branch = match branch_manager {
            Some(manager) => match manager.checkout_for_task(task.title()).await {
                Ok(branch) => Some(branch),
                Err(err) => {
                    break fail(Stage::Agent, err.to_string(), Some(&task));
                }
            },
            None => None,
        };

        let exec = execute_task(
            task.title(),
            &exec_options(options, source.kind()),
            deps.agent.as_ref(),
        )
        .await;

        // Leave the per-task branch behind; its commits belong to the agent.
        if let Some(manager) = branch_manager {
            if let Err(err) = manager.finish_task().await {
                warn!(%err, "finish_task failed");
            }
        }

        let success = match exec {
            Ok(ExecOutcome::Ok(success)) => success,
            Ok(ExecOutcome::Error(failure)) => {
                append_progress(&options.cwd, false, task.title());
                tasks.push(failed_record(&task, failure.attempts, failure.error.clone()));
                break fail(Stage::Agent, failure.error, Some(&task));
            }
            Ok(ExecOutcome::DryRun(_)) => {
                let message = "Dry run not supported for PRD execution".to_string();
                append_progress(&options.cwd, false, task.title());
                tasks.push(failed_record(&task, 0, message.clone()));
                break fail(Stage::Agent, message, Some(&task));
            }
            Err(err) => {
                append_progress(&options.cwd, false, task.title());
                tasks.push(failed_record(&task, 0, err.to_string()));
                break fail(Stage::Agent, err.to_string(), Some(&task));
            }
        };

        usage.absorb(&success.usage);
        append_progress(&options.cwd, true, task.title());
        tasks.push(RunRecord {
            task: task.title().to_string(),
            source: task.source,
            status: RunStatus::Completed,
            attempts: success.attempts,
            response: Some(success.response),
            error: None,
        });
        completed += 1;

        match source.complete(task.title()).await {
            Ok(CompleteOutcome::Updated | CompleteOutcome::AlreadyComplete) => {
                if options.create_pr || options.draft_pr {
                    if let Err(err) = create_pr(options, deps, &task, task_branch).await {
                        break fail(Stage::Pr, err.to_string(), Some(&task));
                    }
                }
            }
            Ok(CompleteOutcome::NotFound) => {
                break fail(
                    Stage::Complete,
                    "Task not found in source".to_string(),
                    Some(&task),
                );
            }
            Err(err) => {
                break fail(Stage::Complete, err.to_string(), Some(&task));
            }
        }
    };

    RunReport {
        outcome,
        iterations,
        completed,
        tasks,
        usage,
    }
}

async fn create_pr(
    options: &PrdOptions,
    deps: &RunDeps,
    task: &Task,
    task_branch: Option<String>,
) -> Result<String> {
    let git = Git::new(&options.cwd);
    let head_branch = match task_branch {
        Some(branch) => branch,
        None => git.current_branch().await?,
    };
    let base_branch = match &options.base_branch {
        Some(base) => base.clone(),
        None => git.current_branch().await?,
    };
    deps.pr
        .create(&PrRequest {
            title: task.title().to_string(),
            body: format!("Automated change for task:\n\n{}", task.title()),
            head_branch,
            base_branch,
            draft: options.draft_pr,
            cwd: options.cwd.clone(),
        })
        .await
}

fn exec_options(options: &PrdOptions, source_kind: SourceKind) -> ExecOptions {
    ExecOptions {
        engine: options.engine,
        cwd: options.cwd.clone(),
        skip_tests: options.skip_tests,
        skip_lint: options.skip_lint,
        auto_commit: options.auto_commit,
        dry_run: options.dry_run,
        max_retries: options.max_retries,
        retry_delay_secs: options.retry_delay_secs,
        prompt_mode: None,
        task_source: Some(source_kind),
        issue_body: None,
    }
}

fn fail(stage: Stage, message: String, task: Option<&Task>) -> RunOutcome {
    RunOutcome::Error {
        failure: StageFailure {
            stage,
            message,
            task: task.map(|task| task.title().to_string()),
        },
    }
}

fn failed_record(task: &Task, attempts: u32, error: String) -> RunRecord {
    RunRecord {
        task: task.title().to_string(),
        source: task.source,
        status: RunStatus::Failed,
        attempts,
        response: None,
        error: Some(error),
    }
}
