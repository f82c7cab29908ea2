//! Prompt composition for agent invocations.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::task::SourceKind;
use crate::io::config::RalphyConfig;

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Everything the task prompt is assembled from.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub task_text: String,
    pub config: RalphyConfig,
    pub skip_tests: bool,
    pub skip_lint: bool,
    pub auto_commit: bool,
    /// Free-form mode hint forwarded by the caller.
    pub prompt_mode: Option<String>,
    pub task_source: Option<SourceKind>,
    /// Body text of the backing issue, for issue-tracker tasks.
    pub issue_body: Option<String>,
}

/// Render the agent prompt for one task.
pub fn build_task_prompt(inputs: &PromptInputs) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("task", TASK_TEMPLATE)
        .context("task template should be valid")?;
    let template = env.get_template("task")?;

    let test_command = effective_command(inputs.config.commands.test.as_deref(), inputs.skip_tests);
    let lint_command = effective_command(inputs.config.commands.lint.as_deref(), inputs.skip_lint);

    let rendered = template.render(context! {
        task => inputs.task_text.trim(),
        mode => inputs.prompt_mode.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        issue_body => issue_body(inputs),
        description => non_empty(&inputs.config.project.description),
        rules => &inputs.config.rules,
        never_touch => (!inputs.config.boundaries.never_touch.is_empty())
            .then_some(&inputs.config.boundaries.never_touch),
        test_command => test_command,
        lint_command => lint_command,
        skip_tests => inputs.skip_tests,
        skip_lint => inputs.skip_lint,
        auto_commit => inputs.auto_commit,
    })?;
    Ok(rendered.trim().to_string())
}

/// Literal prompt instructing the agent to finish a conflicted merge.
pub fn build_merge_prompt(files: &[String]) -> String {
    let listing = files
        .iter()
        .map(|file| format!("- {file}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "A git merge stopped on conflicts in these files:\n{listing}\n\n\
         Read each file, resolve the conflicts, and remove every conflict \
         marker (<<<<<<<, =======, >>>>>>>). Then run `git add` on each \
         resolved file and finish with `git commit --no-edit`. Do not make \
         any unrelated changes."
    )
}

fn issue_body(inputs: &PromptInputs) -> Option<&str> {
    if inputs.task_source != Some(SourceKind::Github) {
        return None;
    }
    inputs
        .issue_body
        .as_deref()
        .map(str::trim)
        .filter(|body| !body.is_empty())
}

fn effective_command(command: Option<&str>, skipped: bool) -> Option<&str> {
    if skipped { None } else { command }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
