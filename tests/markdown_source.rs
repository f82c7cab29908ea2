//! Scenario tests for the Markdown backlog adapter.

use std::path::PathBuf;

use ralphy::core::task::{CompleteOutcome, SourceKind};
use ralphy::io::source::TaskSource;

fn source(dir: &tempfile::TempDir, contents: &str) -> TaskSource {
    let path = dir.path().join("PRD.md");
    std::fs::write(&path, contents).expect("write backlog");
    TaskSource::Markdown { path }
}

fn read(dir: &tempfile::TempDir) -> String {
    std::fs::read_to_string(dir.path().join("PRD.md")).expect("read backlog")
}

/// `next` returns the first incomplete entry with its 1-indexed line.
#[tokio::test]
async fn next_skips_completed_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "- [ ] First task\n- [x] Done\n");

    let task = source.next().await.expect("next").expect("task");
    assert_eq!(task.source, SourceKind::Markdown);
    assert_eq!(task.text, "First task");
    assert_eq!(task.line, Some(1));
    assert!(!task.completed);
}

#[tokio::test]
async fn next_is_none_when_everything_is_done() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "- [x] Done\n- [X] Also done\n");
    assert!(source.next().await.expect("next").is_none());
}

/// Completion rewrites only the matched line; nested indentation and the
/// list marker survive byte-for-byte.
#[tokio::test]
async fn complete_preserves_indentation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "- [ ] First\n  - [ ] Second");

    let outcome = source.complete("Second").await.expect("complete");
    assert_eq!(outcome, CompleteOutcome::Updated);
    assert_eq!(read(&dir), "- [ ] First\n  - [x] Second");
}

#[tokio::test]
async fn complete_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "- [ ] Only task\n");

    assert_eq!(
        source.complete("Only task").await.expect("complete"),
        CompleteOutcome::Updated
    );
    assert_eq!(
        source.complete("Only task").await.expect("complete"),
        CompleteOutcome::AlreadyComplete
    );
    assert_eq!(read(&dir), "- [x] Only task\n");
}

#[tokio::test]
async fn complete_unknown_task_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "- [ ] Only task\n");
    assert_eq!(
        source.complete("Missing").await.expect("complete"),
        CompleteOutcome::NotFound
    );
    // The file is untouched.
    assert_eq!(read(&dir), "- [ ] Only task\n");
}

/// Parsing yields tasks in source order with accurate completion state.
#[tokio::test]
async fn list_reflects_file_state_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(
        &dir,
        "# Backlog\n\n- [ ] Alpha\n* [x] Beta\n\ttext\n  - [ ] Gamma\n",
    );

    let tasks = source.list().await.expect("list");
    let titles: Vec<&str> = tasks.iter().map(|task| task.text.as_str()).collect();
    assert_eq!(titles, vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(tasks[0].line, Some(3));
    assert!(tasks[1].completed);
    assert_eq!(tasks[2].line, Some(6));
}

/// Completion matches by trimmed title.
#[tokio::test]
async fn complete_matches_trimmed_titles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "- [ ] Spaced task \n");
    assert_eq!(
        source.complete("  Spaced task  ").await.expect("complete"),
        CompleteOutcome::Updated
    );
}

#[tokio::test]
async fn missing_file_is_an_adapter_error() {
    let source = TaskSource::Markdown {
        path: PathBuf::from("/nope/PRD.md"),
    };
    let err = source.next().await.unwrap_err();
    assert!(err.to_string().contains("read"));
}
