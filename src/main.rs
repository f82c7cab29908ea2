//! ralphy CLI.
//!
//! The binary is a thin front-end: it starts the HTTP control plane on an
//! ephemeral loopback port, translates the parsed flags into exactly one
//! request against it, prints the JSON response, and exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};

use ralphy::exit_codes;
use ralphy::logging;
use ralphy::server::{AppState, serve};

#[derive(Parser)]
#[command(
    name = "ralphy",
    version,
    about = "Autonomous code-change driver: runs a task backlog through a CLI coding agent"
)]
struct Cli {
    /// Task text for a single run; multiple words are joined into one task.
    #[arg(value_name = "TASK")]
    task: Vec<String>,

    /// Scaffold .ralphy/config.yaml and exit.
    #[arg(long)]
    init: bool,
    /// With --init: overwrite an existing config.
    #[arg(long)]
    force: bool,
    /// Print the effective project config and exit.
    #[arg(long)]
    config: bool,
    /// Append a rule to the project config and exit.
    #[arg(long = "add-rule", value_name = "TEXT")]
    add_rule: Option<String>,

    /// Markdown backlog path (default PRD.md).
    #[arg(long, value_name = "PATH")]
    prd: Option<PathBuf>,
    /// YAML backlog path (wins over --prd).
    #[arg(long, value_name = "PATH")]
    yaml: Option<PathBuf>,
    /// Pull tasks from this repository's open issues (wins over --yaml).
    #[arg(long, value_name = "REPO")]
    github: Option<String>,
    /// Only consider issues with this label.
    #[arg(long = "github-label", value_name = "LABEL")]
    github_label: Option<String>,

    /// Stop after N tasks (omit for unbounded).
    #[arg(long = "max-iterations", value_name = "N")]
    max_iterations: Option<u32>,
    /// Agent attempts per task (default 3).
    #[arg(long = "max-retries", value_name = "N")]
    max_retries: Option<u32>,
    /// Seconds to wait between attempts (default 5).
    #[arg(long = "retry-delay", value_name = "SECONDS")]
    retry_delay: Option<u64>,

    #[arg(long = "skip-tests", visible_alias = "no-tests")]
    skip_tests: bool,
    #[arg(long = "skip-lint", visible_alias = "no-lint")]
    skip_lint: bool,
    /// Shorthand for --skip-tests --skip-lint.
    #[arg(long)]
    fast: bool,
    /// Build the prompt but invoke nothing and write nothing.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Use the claude engine (default).
    #[arg(long)]
    claude: bool,
    #[arg(long)]
    opencode: bool,
    /// Use the cursor engine (binary `agent`).
    #[arg(long, visible_alias = "agent")]
    cursor: bool,
    #[arg(long)]
    codex: bool,
    #[arg(long)]
    qwen: bool,
    #[arg(long)]
    droid: bool,

    /// Run task groups concurrently across git worktrees.
    #[arg(long)]
    parallel: bool,
    /// Worker bound for --parallel (default: one per group).
    #[arg(long = "max-parallel", value_name = "N")]
    max_parallel: Option<u32>,
    /// Isolate each task on its own ralphy/<slug> branch.
    #[arg(long = "branch-per-task")]
    branch_per_task: bool,
    /// Base branch for per-task branches and integration.
    #[arg(long = "base-branch", value_name = "REF")]
    base_branch: Option<String>,
    /// Open a pull request after each completed task.
    #[arg(long = "create-pr")]
    create_pr: bool,
    /// Open pull requests as drafts.
    #[arg(long = "draft-pr")]
    draft_pr: bool,

    /// Ask the agent to commit its work (default on).
    #[arg(long, overrides_with = "no_commit")]
    commit: bool,
    #[arg(long = "no-commit")]
    no_commit: bool,

    /// Debug-level logging for this run.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine(&self) -> Option<&'static str> {
        if self.claude {
            Some("claude")
        } else if self.opencode {
            Some("opencode")
        } else if self.cursor {
            Some("cursor")
        } else if self.codex {
            Some("codex")
        } else if self.qwen {
            Some("qwen")
        } else if self.droid {
            Some("droid")
        } else {
            None
        }
    }

    fn skip_tests(&self) -> bool {
        self.skip_tests || self.fast
    }

    fn skip_lint(&self) -> bool {
        self.skip_lint || self.fast
    }

    fn auto_commit(&self) -> bool {
        !self.no_commit
    }
}

enum Dispatch {
    Get(&'static str),
    Post(&'static str, Value),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let (addr, _server) = serve(AppState::new(&cwd)).await?;
    let base = format!("http://{addr}");

    let dispatch = build_dispatch(&cli);
    let client = reqwest::Client::new();
    let response = match dispatch {
        Dispatch::Get(path) => client.get(format!("{base}{path}")).send().await,
        Dispatch::Post(path, body) => {
            client.post(format!("{base}{path}")).json(&body).send().await
        }
    }
    .context("call control plane")?;

    let http_ok = response.status().is_success();
    let payload: Value = response.json().await.context("decode response")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
    );

    let reported_error = payload.get("status").and_then(Value::as_str) == Some("error");
    if http_ok && !reported_error {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FAILURE)
    }
}

/// Flag precedence: --init, --config, --add-rule, positional task, PRD run.
fn build_dispatch(cli: &Cli) -> Dispatch {
    if cli.init {
        return Dispatch::Post("/v1/config/init", json!({"force": cli.force}));
    }
    if cli.config {
        return Dispatch::Get("/v1/config");
    }
    if let Some(rule) = &cli.add_rule {
        return Dispatch::Post("/v1/config/rules", json!({"rule": rule}));
    }
    if !cli.task.is_empty() {
        return Dispatch::Post("/v1/run/single", single_body(cli));
    }
    Dispatch::Post("/v1/run/prd", prd_body(cli))
}

fn single_body(cli: &Cli) -> Value {
    let mut body = json!({
        "task": cli.task.join(" "),
        "skipTests": cli.skip_tests(),
        "skipLint": cli.skip_lint(),
        "autoCommit": cli.auto_commit(),
        "dryRun": cli.dry_run,
    });
    let map = body.as_object_mut().expect("body is an object");
    if let Some(engine) = cli.engine() {
        map.insert("engine".into(), json!(engine));
    }
    if let Some(max_retries) = cli.max_retries {
        map.insert("maxRetries".into(), json!(max_retries));
    }
    if let Some(retry_delay) = cli.retry_delay {
        map.insert("retryDelay".into(), json!(retry_delay));
    }
    body
}

fn prd_body(cli: &Cli) -> Value {
    let mut body = json!({
        "skipTests": cli.skip_tests(),
        "skipLint": cli.skip_lint(),
        "autoCommit": cli.auto_commit(),
        "dryRun": cli.dry_run,
        "branchPerTask": cli.branch_per_task,
        "createPr": cli.create_pr,
        "draftPr": cli.draft_pr,
        "parallel": cli.parallel,
    });
    let map = body.as_object_mut().expect("body is an object");
    if let Some(prd) = &cli.prd {
        map.insert("prd".into(), json!(prd));
    }
    if let Some(yaml) = &cli.yaml {
        map.insert("yaml".into(), json!(yaml));
    }
    if let Some(github) = &cli.github {
        map.insert("github".into(), json!(github));
    }
    if let Some(label) = &cli.github_label {
        map.insert("githubLabel".into(), json!(label));
    }
    if let Some(engine) = cli.engine() {
        map.insert("engine".into(), json!(engine));
    }
    if let Some(max_iterations) = cli.max_iterations {
        map.insert("maxIterations".into(), json!(max_iterations));
    }
    if let Some(max_retries) = cli.max_retries {
        map.insert("maxRetries".into(), json!(max_retries));
    }
    if let Some(retry_delay) = cli.retry_delay {
        map.insert("retryDelay".into(), json!(retry_delay));
    }
    if let Some(base_branch) = &cli.base_branch {
        map.insert("baseBranch".into(), json!(base_branch));
    }
    if let Some(max_parallel) = cli.max_parallel {
        map.insert("maxParallel".into(), json!(max_parallel));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_args_join_into_one_task() {
        let cli = Cli::parse_from(["ralphy", "add", "a", "health", "endpoint"]);
        let Dispatch::Post(path, body) = build_dispatch(&cli) else {
            panic!("expected post");
        };
        assert_eq!(path, "/v1/run/single");
        assert_eq!(body["task"], "add a health endpoint");
    }

    #[test]
    fn init_wins_over_everything() {
        let cli = Cli::parse_from(["ralphy", "--init", "--config", "some", "task"]);
        assert!(matches!(
            build_dispatch(&cli),
            Dispatch::Post("/v1/config/init", _)
        ));
    }

    #[test]
    fn bare_invocation_runs_the_prd_loop() {
        let cli = Cli::parse_from(["ralphy", "--max-iterations", "2", "--yaml", "tasks.yaml"]);
        let Dispatch::Post(path, body) = build_dispatch(&cli) else {
            panic!("expected post");
        };
        assert_eq!(path, "/v1/run/prd");
        assert_eq!(body["maxIterations"], 2);
        assert_eq!(body["yaml"], "tasks.yaml");
        assert!(body.get("engine").is_none());
    }

    #[test]
    fn fast_implies_skipping_tests_and_lint() {
        let cli = Cli::parse_from(["ralphy", "--fast"]);
        let Dispatch::Post(_, body) = build_dispatch(&cli) else {
            panic!("expected post");
        };
        assert_eq!(body["skipTests"], true);
        assert_eq!(body["skipLint"], true);
    }

    #[test]
    fn no_commit_disables_auto_commit() {
        let cli = Cli::parse_from(["ralphy", "--no-commit"]);
        let Dispatch::Post(_, body) = build_dispatch(&cli) else {
            panic!("expected post");
        };
        assert_eq!(body["autoCommit"], false);

        let cli = Cli::parse_from(["ralphy", "task", "text"]);
        let Dispatch::Post(_, body) = build_dispatch(&cli) else {
            panic!("expected post");
        };
        assert_eq!(body["autoCommit"], true);
    }

    #[test]
    fn engine_flags_select_the_engine() {
        let cli = Cli::parse_from(["ralphy", "--codex", "do", "it"]);
        let Dispatch::Post(_, body) = build_dispatch(&cli) else {
            panic!("expected post");
        };
        assert_eq!(body["engine"], "codex");
    }
}
