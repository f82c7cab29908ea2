//! Parallel PRD scheduler.
//!
//! Tasks are partitioned into groups; a bounded pool of workers pulls groups
//! off a shared queue and runs each group's tasks serially inside its own
//! git worktree. Group results pass through a serialized critical section (a
//! mutex over the results and the advancing integration base) where YAML
//! multi-group runs chain integration branches; after the workers drain, the
//! last integration branch (or each group branch in completion order) is
//! merged into the original base, with an AI resolver for direct conflicts.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::core::grouping::{TaskGroup, partition};
use crate::core::report::{
    PrdResult, RunOutcome, RunRecord, RunReport, RunStatus, Stage, StageFailure, StopReason,
};
use crate::core::task::{CompleteOutcome, SourceKind, Task, slug, unique_name};
use crate::core::usage::Usage;
use crate::executor::{ExecOptions, ExecOutcome, execute_task};
use crate::exit_codes;
use crate::io::git::Git;
use crate::io::source::TaskSource;
use crate::io::worktree::{CleanupOptions, WorktreeManager};
use crate::merge::resolve_conflicts;
use crate::sequential::{PrdOptions, RunDeps};

/// Shared scheduler state, mutated only inside the critical section.
struct SchedulerState {
    /// Base branch for the next group's worktree; advances monotonically as
    /// integration branches are promoted.
    current_base: String,
    integration_branches: Vec<String>,
    /// Group worktree branches, in completion order.
    completed_branches: Vec<String>,
    records: Vec<(usize, RunRecord)>,
    usage: Usage,
    failure: Option<StageFailure>,
}

struct WorkerContext {
    options: PrdOptions,
    deps: RunDeps,
    source_kind: SourceKind,
    task_source_path: Option<PathBuf>,
    /// YAML with more than one group: promote each group into a chained
    /// integration branch.
    chain_integration: bool,
    state: Arc<Mutex<SchedulerState>>,
    worktrees: Arc<Mutex<WorktreeManager>>,
    queue: Arc<std::sync::Mutex<VecDeque<TaskGroup>>>,
    git: Git,
}

/// Run the backlog's groups concurrently and integrate their branches.
#[instrument(skip_all)]
pub(crate) async fn run_parallel(
    options: &PrdOptions,
    deps: &RunDeps,
    source: TaskSource,
) -> Result<PrdResult> {
    if options.branch_per_task || options.create_pr || options.draft_pr {
        return Ok(PrdResult::Report(RunReport::failed(StageFailure::new(
            Stage::Pr,
            "Parallel mode cannot be combined with branch-per-task or PR creation",
        ))));
    }
    if source.kind() == SourceKind::Github {
        return Ok(PrdResult::Report(RunReport::failed(StageFailure::new(
            Stage::TaskSource,
            "Parallel mode requires a file-backed task source",
        ))));
    }
    if options.max_iterations == Some(0) {
        return Ok(PrdResult::Report(RunReport::stopped(
            StopReason::MaxIterations,
        )));
    }

    let all_tasks = match source.list().await {
        Ok(tasks) => tasks,
        Err(err) => {
            return Ok(PrdResult::Report(RunReport::failed(StageFailure::new(
                Stage::TaskSource,
                err.to_string(),
            ))));
        }
    };
    let incomplete = all_tasks.iter().filter(|task| !task.completed).count();
    let groups = partition(all_tasks, options.max_iterations);
    if groups.is_empty() {
        return Ok(PrdResult::Report(RunReport::stopped(StopReason::NoTasks)));
    }
    let truncated = options
        .max_iterations
        .is_some_and(|limit| (limit as usize) < incomplete);

    let git = Git::new(&options.cwd);
    let original_base = git.current_branch().await?;
    let group_count = groups.len();
    let worker_count = options
        .max_parallel
        .unwrap_or(group_count as u32)
        .clamp(1, group_count as u32) as usize;
    info!(groups = group_count, workers = worker_count, "starting parallel run");

    let context = Arc::new(WorkerContext {
        options: options.clone(),
        deps: deps.clone(),
        source_kind: source.kind(),
        task_source_path: source.path().map(PathBuf::from),
        chain_integration: source.kind() == SourceKind::Yaml && group_count > 1,
        state: Arc::new(Mutex::new(SchedulerState {
            current_base: original_base.clone(),
            integration_branches: Vec::new(),
            completed_branches: Vec::new(),
            records: Vec::new(),
            usage: Usage::default(),
            failure: None,
        })),
        worktrees: Arc::new(Mutex::new(WorktreeManager::new(&options.cwd, None, None))),
        queue: Arc::new(std::sync::Mutex::new(VecDeque::from(groups))),
        git: git.clone(),
    });

    let armed = Arc::new(AtomicBool::new(true));
    let signal_task = spawn_signal_handler(armed.clone(), context.worktrees.clone());

    let workers: Vec<_> = (0..worker_count)
        .map(|_| tokio::spawn(worker_loop(context.clone())))
        .collect();
    for worker in workers {
        if let Err(err) = worker.await {
            warn!(%err, "worker panicked");
        }
    }

    armed.store(false, Ordering::SeqCst);
    signal_task.abort();

    let state = {
        let mut state = context.state.lock().await;
        SchedulerState {
            current_base: std::mem::take(&mut state.current_base),
            integration_branches: std::mem::take(&mut state.integration_branches),
            completed_branches: std::mem::take(&mut state.completed_branches),
            records: std::mem::take(&mut state.records),
            usage: std::mem::take(&mut state.usage),
            failure: state.failure.take(),
        }
    };

    let outcome = match state.failure {
        Some(failure) => RunOutcome::Error { failure },
        None => {
            match integrate(options, deps, &git, &original_base, &state).await {
                Ok(()) => RunOutcome::Ok {
                    stopped: if truncated {
                        StopReason::MaxIterations
                    } else {
                        StopReason::NoTasks
                    },
                },
                Err(failure) => RunOutcome::Error { failure },
            }
        }
    };

    cleanup_worktrees(&context.worktrees).await;
    Ok(PrdResult::Report(build_report(outcome, state.records, state.usage)))
}

/// Final integration: merge the work back into the original base branch.
async fn integrate(
    options: &PrdOptions,
    deps: &RunDeps,
    git: &Git,
    original_base: &str,
    state: &SchedulerState,
) -> std::result::Result<(), StageFailure> {
    git.checkout(original_base).await.map_err(merge_failure)?;

    if let Some(last) = state.integration_branches.last() {
        // The last integration branch transitively contains every earlier one.
        git.merge_no_edit(last).await.map_err(merge_failure)?;
        for branch in &state.integration_branches {
            if let Err(err) = git.delete_branch(branch, true).await {
                warn!(%err, "failed to delete integration branch");
            }
        }
        return Ok(());
    }

    let mut unresolved: Vec<String> = Vec::new();
    for branch in &state.completed_branches {
        match git.merge_no_edit(branch).await {
            Ok(()) => {}
            Err(merge_err) => {
                let conflicted = git.conflicted_files().await.unwrap_or_default();
                if conflicted.is_empty() {
                    return Err(merge_failure(merge_err));
                }
                match resolve_conflicts(&options.cwd, options.engine, deps.agent.as_ref()).await {
                    Ok(()) => {
                        if let Err(err) = git.delete_branch(branch, false).await {
                            warn!(%err, "failed to delete merged branch");
                        }
                    }
                    Err(_) => unresolved.push(branch.clone()),
                }
            }
        }
    }
    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(StageFailure::new(
            Stage::Merge,
            format!("Merge conflicts remain in: {}", unresolved.join(", ")),
        ))
    }
}

async fn worker_loop(context: Arc<WorkerContext>) {
    loop {
        // Stop pulling new groups once another worker has failed.
        if context.state.lock().await.failure.is_some() {
            return;
        }
        let group = context.queue.lock().expect("queue lock").pop_front();
        let Some(group) = group else { return };
        run_group(&context, group).await;
    }
}

async fn run_group(context: &WorkerContext, group: TaskGroup) {
    debug!(group = %group.key, tasks = group.tasks.len(), "starting group");

    let base = context.state.lock().await.current_base.clone();
    let worktree = {
        let mut manager = context.worktrees.lock().await;
        manager
            .allocate(&group.key, Some(&base), context.task_source_path.as_deref())
            .await
    };
    let worktree = match worktree {
        Ok(worktree) => worktree,
        Err(err) => {
            let mut state = context.state.lock().await;
            if state.failure.is_none() {
                state.failure = Some(StageFailure::new(Stage::Agent, err.to_string()));
            }
            return;
        }
    };

    let worktree_source = worktree.copied_task_source.clone().and_then(|path| {
        match context.source_kind {
            SourceKind::Markdown => Some(TaskSource::Markdown { path }),
            SourceKind::Yaml => Some(TaskSource::Yaml { path }),
            SourceKind::Github => None,
        }
    });

    let mut records: Vec<(usize, RunRecord)> = Vec::new();
    let mut usage = Usage::default();
    let mut failure: Option<StageFailure> = None;

    // Tasks within a group run strictly serially, in source order.
    for indexed in &group.tasks {
        let task = &indexed.task;
        info!(group = %group.key, task = %task.title(), "executing task");
        let exec = execute_task(
            task.title(),
            &group_exec_options(context, &worktree.path),
            context.deps.agent.as_ref(),
        )
        .await;

        let success = match exec {
            Ok(ExecOutcome::Ok(success)) => success,
            Ok(ExecOutcome::Error(exec_failure)) => {
                records.push((
                    indexed.index,
                    failed_record(task, exec_failure.attempts, exec_failure.error.clone()),
                ));
                failure = Some(task_failure(Stage::Agent, exec_failure.error, task));
                break;
            }
            Ok(ExecOutcome::DryRun(_)) => {
                let message = "Dry run not supported for PRD execution".to_string();
                records.push((indexed.index, failed_record(task, 0, message.clone())));
                failure = Some(task_failure(Stage::Agent, message, task));
                break;
            }
            Err(err) => {
                records.push((indexed.index, failed_record(task, 0, err.to_string())));
                failure = Some(task_failure(Stage::Agent, err.to_string(), task));
                break;
            }
        };

        usage.absorb(&success.usage);
        records.push((
            indexed.index,
            RunRecord {
                task: task.title().to_string(),
                source: task.source,
                status: RunStatus::Completed,
                attempts: success.attempts,
                response: Some(success.response),
                error: None,
            },
        ));

        // Completion is written against the worktree's copy of the source.
        let complete = match &worktree_source {
            Some(source) => source.complete(task.title()).await,
            None => Err(anyhow::anyhow!("task source was not copied into worktree")),
        };
        match complete {
            Ok(CompleteOutcome::Updated | CompleteOutcome::AlreadyComplete) => {}
            Ok(CompleteOutcome::NotFound) => {
                failure = Some(task_failure(
                    Stage::Complete,
                    "Task not found in source".to_string(),
                    task,
                ));
                break;
            }
            Err(err) => {
                failure = Some(task_failure(Stage::Complete, err.to_string(), task));
                break;
            }
        }
    }

    // Serialization point: publish results and promote the group's branch.
    let mut state = context.state.lock().await;
    state.records.extend(records);
    state.usage.absorb(&usage);
    if let Some(failure) = failure {
        if state.failure.is_none() {
            state.failure = Some(failure);
        }
        return;
    }
    state.completed_branches.push(worktree.branch.clone());
    if context.chain_integration {
        if let Err(failure) =
            promote_group(context, &mut state, &group.key, &worktree.branch).await
        {
            if state.failure.is_none() {
                state.failure = Some(failure);
            }
        }
    }
}

/// Promote a finished group's branch into a chained integration branch and
/// advance the scheduler's base. Runs with the state lock held.
async fn promote_group(
    context: &WorkerContext,
    state: &mut SchedulerState,
    group_key: &str,
    branch: &str,
) -> std::result::Result<(), StageFailure> {
    let git = &context.git;
    let taken = git.branch_list().await.map_err(merge_failure)?;
    let integration = unique_name(
        &format!("ralphy/integration-group-{}", slug(group_key)),
        &taken,
    );

    git.create_branch(&integration, &state.current_base)
        .await
        .map_err(merge_failure)?;
    let prior = git.current_branch().await.map_err(merge_failure)?;
    git.checkout(&integration).await.map_err(merge_failure)?;

    if let Err(err) = git.merge_no_edit(branch).await {
        if let Err(abort_err) = git.merge_abort().await {
            debug!(%abort_err, "merge abort after failed integration");
        }
        let _ = git.checkout(&prior).await;
        let _ = git.delete_branch(&integration, true).await;
        return Err(merge_failure(err));
    }

    git.checkout(&prior).await.map_err(merge_failure)?;
    info!(integration = %integration, "promoted group into integration branch");
    state.current_base = integration.clone();
    state.integration_branches.push(integration);
    Ok(())
}

fn group_exec_options(context: &WorkerContext, worktree: &std::path::Path) -> ExecOptions {
    let options = &context.options;
    ExecOptions {
        engine: options.engine,
        cwd: worktree.to_path_buf(),
        skip_tests: options.skip_tests,
        skip_lint: options.skip_lint,
        auto_commit: options.auto_commit,
        dry_run: options.dry_run,
        max_retries: options.max_retries,
        retry_delay_secs: options.retry_delay_secs,
        prompt_mode: None,
        task_source: Some(context.source_kind),
        issue_body: None,
    }
}

async fn cleanup_worktrees(worktrees: &Arc<Mutex<WorktreeManager>>) {
    let mut manager = worktrees.lock().await;
    if let Err(err) = manager.cleanup(CleanupOptions::default()).await {
        warn!(%err, "worktree cleanup failed");
    }
}

fn build_report(
    outcome: RunOutcome,
    mut records: Vec<(usize, RunRecord)>,
    usage: Usage,
) -> RunReport {
    // Completion order back to source order.
    records.sort_by_key(|(index, _)| *index);
    let tasks: Vec<RunRecord> = records.into_iter().map(|(_, record)| record).collect();
    let iterations = tasks.len() as u32;
    let completed = tasks
        .iter()
        .filter(|record| record.status == RunStatus::Completed)
        .count() as u32;
    RunReport {
        outcome,
        iterations,
        completed,
        tasks,
        usage,
    }
}

fn merge_failure(err: anyhow::Error) -> StageFailure {
    StageFailure::new(Stage::Merge, err.to_string())
}

fn task_failure(stage: Stage, message: String, task: &Task) -> StageFailure {
    StageFailure::for_task(stage, message, task.title())
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

/// One-shot SIGINT/SIGTERM handler: preserve dirty worktrees, keep branches,
/// exit 130/143. Disarmed and aborted on normal scheduler exit.
#[cfg(unix)]
fn spawn_signal_handler(
    armed: Arc<AtomicBool>,
    worktrees: Arc<Mutex<WorktreeManager>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "failed to install SIGINT handler");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "failed to install SIGTERM handler");
                return;
            }
        };

        let code = tokio::select! {
            _ = interrupt.recv() => exit_codes::SIGINT,
            _ = terminate.recv() => exit_codes::SIGTERM,
        };
        if !armed.swap(false, Ordering::SeqCst) {
            return;
        }
        warn!(code, "signal received, cleaning up worktrees");
        let mut manager = worktrees.lock().await;
        if let Err(err) = manager
            .cleanup(CleanupOptions {
                remove_branches: false,
                preserve_dirty: true,
            })
            .await
        {
            warn!(%err, "signal-driven worktree cleanup failed");
        }
        std::process::exit(code);
    })
}

#[cfg(not(unix))]
fn spawn_signal_handler(
    _armed: Arc<AtomicBool>,
    _worktrees: Arc<Mutex<WorktreeManager>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {})
}
