//! Loop-level tests for the sequential PRD runner: full lifecycle against a
//! real git repository with a scripted agent.

use std::sync::Arc;

use ralphy::core::report::{PrdResult, RunOutcome, RunReport, RunStatus, Stage, StopReason};
use ralphy::sequential::{PrdOptions, RunDeps, run_prd};
use ralphy::test_support::{
    RecordingPr, ScriptedAgent, ScriptedIssues, ScriptedReply, TestRepo, result_line,
};

fn deps(agent: Arc<ScriptedAgent>, pr: Arc<RecordingPr>) -> RunDeps {
    RunDeps {
        agent,
        pr,
        issues: Arc::new(ScriptedIssues::new(Vec::new())),
    }
}

fn options(repo: &TestRepo) -> PrdOptions {
    PrdOptions {
        retry_delay_secs: 0,
        ..PrdOptions::new(repo.root())
    }
}

fn report(result: PrdResult) -> RunReport {
    match result {
        PrdResult::Report(report) => report,
        PrdResult::Preflight(failures) => panic!("unexpected preflight failure: {failures:?}"),
    }
}

/// `maxIterations: 0` returns immediately without invoking the agent.
#[tokio::test]
async fn zero_iterations_does_no_work() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] First task\n");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(Vec::new()));
    let result = run_prd(
        &PrdOptions {
            max_iterations: Some(0),
            ..options(&repo)
        },
        &deps(agent.clone(), Arc::new(RecordingPr::new())),
    )
    .await
    .expect("run");

    let json = result.to_json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["stopped"], "max-iterations");
    assert_eq!(json["iterations"], 0);
    assert_eq!(json["completed"], 0);
    assert_eq!(json["tasks"], serde_json::json!([]));
    assert_eq!(
        json["usage"],
        serde_json::json!({"inputTokens": 0, "outputTokens": 0})
    );
    assert_eq!(agent.invocations(), 0);
}

/// The loop drains the backlog, marking each task complete in the file and
/// accumulating usage across tasks.
#[tokio::test]
async fn drains_backlog_and_accumulates_usage() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] First task\n- [ ] Second task\n");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(vec![
        ScriptedReply::ok(&result_line("did the first", 10, 20)),
        ScriptedReply::ok(&result_line("did the second", 1, 2)),
    ]));
    let result = run_prd(&options(&repo), &deps(agent.clone(), Arc::new(RecordingPr::new())))
        .await
        .expect("run");

    let report = report(result);
    assert!(matches!(
        report.outcome,
        RunOutcome::Ok {
            stopped: StopReason::NoTasks
        }
    ));
    assert_eq!(report.iterations, 2);
    assert_eq!(report.completed, 2);
    assert_eq!(report.tasks.len(), 2);
    assert_eq!(report.tasks[0].task, "First task");
    assert_eq!(report.tasks[0].status, RunStatus::Completed);
    assert_eq!(report.tasks[0].response.as_deref(), Some("did the first"));
    assert_eq!(report.tasks[1].task, "Second task");
    assert_eq!(report.usage.input_tokens, 11);
    assert_eq!(report.usage.output_tokens, 22);

    assert_eq!(repo.read("PRD.md"), "- [x] First task\n- [x] Second task\n");
}

/// A finite limit stops the loop before the backlog is empty.
#[tokio::test]
async fn max_iterations_limits_work() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] First task\n- [ ] Second task\n");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(vec![ScriptedReply::ok(&result_line(
        "done", 0, 0,
    ))]));
    let result = run_prd(
        &PrdOptions {
            max_iterations: Some(1),
            ..options(&repo)
        },
        &deps(agent, Arc::new(RecordingPr::new())),
    )
    .await
    .expect("run");

    let report = report(result);
    assert!(matches!(
        report.outcome,
        RunOutcome::Ok {
            stopped: StopReason::MaxIterations
        }
    ));
    assert_eq!(report.iterations, 1);
    assert_eq!(repo.read("PRD.md"), "- [x] First task\n- [ ] Second task\n");
}

/// Agent exhaustion stops the run with an agent-stage failure, a failed run
/// record, and a ✗ line in the (pre-existing) progress log.
#[tokio::test]
async fn agent_failure_reports_agent_stage() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] First task\n");
    repo.write(".ralphy/progress.txt", "");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(vec![ScriptedReply::exit(1, "", "boom")]));
    let result = run_prd(
        &PrdOptions {
            max_retries: 1,
            ..options(&repo)
        },
        &deps(agent, Arc::new(RecordingPr::new())),
    )
    .await
    .expect("run");

    let report = report(result);
    let RunOutcome::Error { failure } = &report.outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.stage, Stage::Agent);
    assert_eq!(failure.message, "Agent exited with code 1");
    assert_eq!(failure.task.as_deref(), Some("First task"));
    assert_eq!(report.iterations, 1);
    assert_eq!(report.completed, 0);
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].status, RunStatus::Failed);

    let progress = repo.read(".ralphy/progress.txt");
    assert!(progress.contains("[✗]"));
    assert!(progress.contains("First task"));
    // The task stays open in the source.
    assert_eq!(repo.read("PRD.md"), "- [ ] First task\n");
}

/// Dry run makes no sense mid-loop and is reported as an agent error.
#[tokio::test]
async fn dry_run_inside_loop_is_an_agent_error() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] First task\n");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(Vec::new()));
    let result = run_prd(
        &PrdOptions {
            dry_run: true,
            ..options(&repo)
        },
        &deps(agent.clone(), Arc::new(RecordingPr::new())),
    )
    .await
    .expect("run");

    let report = report(result);
    let RunOutcome::Error { failure } = &report.outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.stage, Stage::Agent);
    assert_eq!(failure.message, "Dry run not supported for PRD execution");
    assert_eq!(agent.invocations(), 0);
}

/// If the task vanished from the source between execution and completion,
/// the run fails at the complete stage.
#[tokio::test]
async fn complete_not_found_reports_complete_stage() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] First task\n");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(vec![
        ScriptedReply::ok(&result_line("done", 0, 0)).with_effect(|request| {
            std::fs::write(request.cwd.join("PRD.md"), "- [ ] Replaced task\n")
                .expect("rewrite backlog");
        }),
    ]));
    let result = run_prd(&options(&repo), &deps(agent, Arc::new(RecordingPr::new())))
        .await
        .expect("run");

    let report = report(result);
    let RunOutcome::Error { failure } = &report.outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.stage, Stage::Complete);
    assert_eq!(failure.message, "Task not found in source");
}

/// Branch-per-task: each task runs on its own `ralphy/<slug>` branch, the
/// branch is left in place, and the loop ends back on the original branch.
#[tokio::test]
async fn branch_per_task_creates_and_leaves_branches() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] Add user auth\n");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(vec![ScriptedReply::ok(&result_line(
        "done", 0, 0,
    ))]));
    let result = run_prd(
        &PrdOptions {
            branch_per_task: true,
            ..options(&repo)
        },
        &deps(agent.clone(), Arc::new(RecordingPr::new())),
    )
    .await
    .expect("run");

    assert!(report(result).is_ok());
    assert_eq!(repo.current_branch(), "main");
    let branches = repo.git(&["branch", "--list", "--format=%(refname:short)"]).expect("list");
    assert!(branches.contains("ralphy/add-user-auth"));
    // The agent ran on the task branch.
    let request = &agent.requests()[0];
    assert_eq!(request.cwd, repo.root());
    // Completion was written on the base branch.
    assert_eq!(repo.read("PRD.md"), "- [x] Add user auth\n");
}

/// PR creation fires after completion with the per-task branch as head.
#[tokio::test]
async fn create_pr_sends_task_branch_as_head() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] Ship it\n");
    repo.commit_all("backlog");

    let pr = Arc::new(RecordingPr::new());
    let agent = Arc::new(ScriptedAgent::new(vec![ScriptedReply::ok(&result_line(
        "done", 0, 0,
    ))]));
    let result = run_prd(
        &PrdOptions {
            branch_per_task: true,
            create_pr: true,
            ..options(&repo)
        },
        &deps(agent, pr.clone()),
    )
    .await
    .expect("run");

    assert!(report(result).is_ok());
    let requests = pr.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].title, "Ship it");
    assert_eq!(requests[0].head_branch, "ralphy/ship-it");
    assert_eq!(requests[0].base_branch, "main");
    assert!(!requests[0].draft);
}

/// A failing PR call stops the run with a pr-stage failure; the task itself
/// stays completed.
#[tokio::test]
async fn pr_failure_reports_pr_stage() {
    let repo = TestRepo::new().expect("repo");
    repo.write("PRD.md", "- [ ] Ship it\n");
    repo.commit_all("backlog");

    let agent = Arc::new(ScriptedAgent::new(vec![ScriptedReply::ok(&result_line(
        "done", 0, 0,
    ))]));
    let result = run_prd(
        &PrdOptions {
            branch_per_task: true,
            draft_pr: true,
            ..options(&repo)
        },
        &deps(agent, Arc::new(RecordingPr::failing())),
    )
    .await
    .expect("run");

    let report = report(result);
    let RunOutcome::Error { failure } = &report.outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.stage, Stage::Pr);
    assert_eq!(report.completed, 1);
    assert_eq!(repo.read("PRD.md"), "- [x] Ship it\n");
}

/// Pre-flight failures are reported before any work happens.
#[tokio::test]
async fn preflight_rejects_missing_git_and_source() {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = Arc::new(ScriptedAgent::new(Vec::new()));
    let result = run_prd(
        &PrdOptions::new(dir.path()),
        &deps(agent.clone(), Arc::new(RecordingPr::new())),
    )
    .await
    .expect("run");

    let PrdResult::Preflight(failures) = result else {
        panic!("expected preflight failure");
    };
    assert!(failures.iter().any(|failure| failure.contains(".git")));
    assert!(failures.iter().any(|failure| failure.contains("PRD.md")));
    assert_eq!(agent.invocations(), 0);
}
