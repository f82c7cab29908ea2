//! Uniform next/complete contract over the three backlog backends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::core::markdown;
use crate::core::task::{CompleteOutcome, SourceKind, Task};
use crate::core::yaml_tasks;
use crate::io::gh::{GithubIssues, IssueRunner};

/// Default Markdown backlog path.
pub const DEFAULT_PRD_PATH: &str = "PRD.md";

/// Caller selection of a backlog backend.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub prd: Option<PathBuf>,
    pub yaml: Option<PathBuf>,
    pub github: Option<String>,
    pub github_label: Option<String>,
}

/// A selected backlog backend.
pub enum TaskSource {
    Markdown { path: PathBuf },
    Yaml { path: PathBuf },
    Github(GithubIssues),
}

impl TaskSource {
    /// Choose a backend: github wins over yaml, which wins over Markdown
    /// (default `PRD.md` relative to `cwd`).
    pub fn select(cwd: &Path, options: &SourceOptions, issues: Arc<dyn IssueRunner>) -> TaskSource {
        if options.github.is_some() {
            let repo = options
                .github
                .as_ref()
                .filter(|repo| !repo.trim().is_empty())
                .cloned();
            return TaskSource::Github(GithubIssues::new(
                repo,
                options.github_label.clone(),
                issues,
            ));
        }
        if let Some(yaml) = &options.yaml {
            return TaskSource::Yaml {
                path: absolute(cwd, yaml),
            };
        }
        let prd = options
            .prd
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PRD_PATH));
        TaskSource::Markdown {
            path: absolute(cwd, &prd),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            TaskSource::Markdown { .. } => SourceKind::Markdown,
            TaskSource::Yaml { .. } => SourceKind::Yaml,
            TaskSource::Github(_) => SourceKind::Github,
        }
    }

    /// The backing file, for file-backed sources.
    pub fn path(&self) -> Option<&Path> {
        match self {
            TaskSource::Markdown { path } | TaskSource::Yaml { path } => Some(path),
            TaskSource::Github(_) => None,
        }
    }

    /// Every task in source order (file-backed sources only report what the
    /// file holds; the issue backend lists open issues).
    pub async fn list(&self) -> Result<Vec<Task>> {
        match self {
            TaskSource::Markdown { path } => {
                let contents = read(path)?;
                Ok(markdown::parse_tasks(&contents)
                    .into_iter()
                    .map(|entry| Task {
                        source: SourceKind::Markdown,
                        text: entry.text,
                        line: Some(entry.line),
                        url: None,
                        number: None,
                        group: None,
                        completed: entry.completed,
                    })
                    .collect())
            }
            TaskSource::Yaml { path } => {
                let contents = read(path)?;
                Ok(yaml_tasks::parse_tasks(&contents)
                    .into_iter()
                    .map(|entry| Task {
                        source: SourceKind::Yaml,
                        text: entry.title,
                        line: Some(entry.line),
                        url: None,
                        number: None,
                        group: Some(entry.parallel_group),
                        completed: entry.completed,
                    })
                    .collect())
            }
            TaskSource::Github(issues) => {
                Ok(issues.next().await?.into_iter().collect())
            }
        }
    }

    /// Next incomplete task, if any.
    #[instrument(skip_all)]
    pub async fn next(&self) -> Result<Option<Task>> {
        match self {
            TaskSource::Github(issues) => issues.next().await,
            _ => Ok(self
                .list()
                .await?
                .into_iter()
                .find(|task| !task.completed)),
        }
    }

    /// Mark the task with the given title complete in this source.
    #[instrument(skip_all)]
    pub async fn complete(&self, title: &str) -> Result<CompleteOutcome> {
        match self {
            TaskSource::Markdown { path } => {
                let contents = read(path)?;
                apply_edit(path, markdown::complete_task(&contents, title).into())
            }
            TaskSource::Yaml { path } => {
                let contents = read(path)?;
                apply_edit(path, yaml_tasks::complete_task(&contents, title).into())
            }
            TaskSource::Github(issues) => issues.complete(title).await,
        }
    }
}

/// Common shape of the two pure completion edits.
enum Edit {
    Updated(String),
    AlreadyComplete,
    NotFound,
}

impl From<markdown::CompleteEdit> for Edit {
    fn from(edit: markdown::CompleteEdit) -> Self {
        match edit {
            markdown::CompleteEdit::Updated(contents) => Edit::Updated(contents),
            markdown::CompleteEdit::AlreadyComplete => Edit::AlreadyComplete,
            markdown::CompleteEdit::NotFound => Edit::NotFound,
        }
    }
}

impl From<yaml_tasks::CompleteEdit> for Edit {
    fn from(edit: yaml_tasks::CompleteEdit) -> Self {
        match edit {
            yaml_tasks::CompleteEdit::Updated(contents) => Edit::Updated(contents),
            yaml_tasks::CompleteEdit::AlreadyComplete => Edit::AlreadyComplete,
            yaml_tasks::CompleteEdit::NotFound => Edit::NotFound,
        }
    }
}

fn apply_edit(path: &Path, edit: Edit) -> Result<CompleteOutcome> {
    match edit {
        Edit::Updated(contents) => {
            std::fs::write(path, contents)
                .with_context(|| format!("write {}", path.display()))?;
            Ok(CompleteOutcome::Updated)
        }
        Edit::AlreadyComplete => Ok(CompleteOutcome::AlreadyComplete),
        Edit::NotFound => Ok(CompleteOutcome::NotFound),
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
