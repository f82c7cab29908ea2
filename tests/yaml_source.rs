//! Scenario tests for the YAML backlog adapter.

use ralphy::core::task::{CompleteOutcome, SourceKind};
use ralphy::io::source::TaskSource;

fn source(dir: &tempfile::TempDir, contents: &str) -> TaskSource {
    let path = dir.path().join("tasks.yaml");
    std::fs::write(&path, contents).expect("write backlog");
    TaskSource::Yaml { path }
}

fn read(dir: &tempfile::TempDir) -> String {
    std::fs::read_to_string(dir.path().join("tasks.yaml")).expect("read backlog")
}

#[tokio::test]
async fn next_returns_first_incomplete_with_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(
        &dir,
        "tasks:\n  - title: First\n    completed: true\n  - title: Second\n    parallel_group: 3\n",
    );

    let task = source.next().await.expect("next").expect("task");
    assert_eq!(task.source, SourceKind::Yaml);
    assert_eq!(task.text, "Second");
    assert_eq!(task.group, Some(3));
    assert_eq!(task.line, Some(4));
}

/// Completing a task with no `completed:` property inserts one directly
/// beneath the title line, indented to match the block.
#[tokio::test]
async fn complete_inserts_flag_after_title() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(
        &dir,
        "tasks:\n  - title: First task\n  - title: Second task\n",
    );

    assert_eq!(
        source.complete("Second task").await.expect("complete"),
        CompleteOutcome::Updated
    );
    assert_eq!(
        read(&dir),
        "tasks:\n  - title: First task\n  - title: Second task\n    completed: true\n"
    );
}

/// An existing `completed:` line is rewritten in place; indentation, the
/// `parallel_group` property, and trailing comments all survive.
#[tokio::test]
async fn complete_updates_existing_flag_preserving_the_rest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = "name: demo\ntasks:\n  - title: Task one\n    completed: false # pending\n    parallel_group: 2\nfooter: keep\n";
    let source = source(&dir, input);

    assert_eq!(
        source.complete("Task one").await.expect("complete"),
        CompleteOutcome::Updated
    );
    let output = read(&dir);
    let diff: Vec<(&str, &str)> = input
        .split('\n')
        .zip(output.split('\n'))
        .filter(|(before, after)| before != after)
        .collect();
    assert_eq!(
        diff,
        vec![(
            "    completed: false # pending",
            "    completed: true # pending"
        )]
    );
}

#[tokio::test]
async fn complete_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "tasks:\n  - title: Once\n");

    assert_eq!(
        source.complete("Once").await.expect("complete"),
        CompleteOutcome::Updated
    );
    assert_eq!(
        source.complete("Once").await.expect("complete"),
        CompleteOutcome::AlreadyComplete
    );
}

#[tokio::test]
async fn complete_unknown_task_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "tasks:\n  - title: Once\n");
    assert_eq!(
        source.complete("Twice").await.expect("complete"),
        CompleteOutcome::NotFound
    );
}

/// Quoted titles are matched unquoted; group defaults to zero.
#[tokio::test]
async fn quoted_titles_and_default_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = source(&dir, "tasks:\n  - title: \"Quoted: task\"\n");

    let task = source.next().await.expect("next").expect("task");
    assert_eq!(task.text, "Quoted: task");
    assert_eq!(task.group, Some(0));

    assert_eq!(
        source.complete("Quoted: task").await.expect("complete"),
        CompleteOutcome::Updated
    );
}
