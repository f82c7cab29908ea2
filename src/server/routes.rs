//! HTTP route handlers for the control plane API.

use std::path::PathBuf;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::engine::Engine;
use crate::core::task::{CompleteOutcome, SourceKind};
use crate::executor::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, ExecOptions, execute_task,
};
use crate::io::config;
use crate::io::source::{SourceOptions, TaskSource};
use crate::sequential::{PrdOptions, run_prd};
use crate::server::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

type ApiResponse = (StatusCode, Json<Value>);

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/version", get(version))
        .route("/v1/config/init", post(config_init))
        .route("/v1/config", get(config_show))
        .route("/v1/config/rules", post(config_add_rule))
        .route("/v1/tasks/next", get(tasks_next))
        .route("/v1/tasks/complete", post(tasks_complete))
        .route("/v1/run/single", post(run_single))
        .route("/v1/run/prd", post(run_prd_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": VERSION}))
}

async fn version() -> Json<Value> {
    Json(json!({"version": VERSION}))
}

async fn not_found() -> ApiResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not Found"})))
}

fn bad_request(message: impl Into<String>) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": message.into()})),
    )
}

fn internal_error(message: impl std::fmt::Display) -> ApiResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": message.to_string()})),
    )
}

fn ok(value: Value) -> ApiResponse {
    (StatusCode::OK, Json(value))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigInitRequest {
    force: bool,
}

async fn config_init(
    State(state): State<AppState>,
    Json(body): Json<ConfigInitRequest>,
) -> ApiResponse {
    match config::init_config(&state.cwd, body.force) {
        Ok(path) => ok(json!({"status": "ok", "path": path.display().to_string()})),
        Err(err) => bad_request(err.to_string()),
    }
}

async fn config_show(State(state): State<AppState>) -> ApiResponse {
    match config::load_config(&state.cwd) {
        Ok(config) => match serde_json::to_value(&config) {
            Ok(value) => ok(value),
            Err(err) => internal_error(err),
        },
        Err(err) => internal_error(err),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddRuleRequest {
    rule: Option<String>,
}

async fn config_add_rule(
    State(state): State<AppState>,
    Json(body): Json<AddRuleRequest>,
) -> ApiResponse {
    let rule = body.rule.unwrap_or_default();
    if rule.trim().is_empty() {
        return bad_request("rule is required");
    }
    match config::add_rule(&state.cwd, &rule) {
        Ok(()) => ok(json!({"status": "ok", "rule": rule.trim()})),
        Err(err) => internal_error(err),
    }
}

/// Task-source selection parameters, shared by queries and bodies.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SourceParams {
    prd: Option<String>,
    yaml: Option<String>,
    github: Option<String>,
    github_label: Option<String>,
}

impl SourceParams {
    fn to_options(&self) -> SourceOptions {
        SourceOptions {
            prd: self.prd.clone().map(PathBuf::from),
            yaml: self.yaml.clone().map(PathBuf::from),
            github: self.github.clone(),
            github_label: self.github_label.clone(),
        }
    }
}

async fn tasks_next(
    State(state): State<AppState>,
    Query(params): Query<SourceParams>,
) -> ApiResponse {
    let source = TaskSource::select(&state.cwd, &params.to_options(), state.deps.issues.clone());
    let kind = source.kind();
    match source.next().await {
        Ok(Some(task)) => ok(json!({"status": "ok", "task": task})),
        Ok(None) => ok(json!({"status": "empty", "source": kind})),
        Err(err) => ok(json!({
            "status": "error",
            "source": kind,
            "message": err.to_string(),
        })),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CompleteRequest {
    task: Option<String>,
    #[serde(flatten)]
    source: SourceParams,
}

async fn tasks_complete(
    State(state): State<AppState>,
    Json(request): Json<CompleteRequest>,
) -> ApiResponse {
    let Some(task) = request.task.filter(|task| !task.trim().is_empty()) else {
        return bad_request("task is required");
    };

    let source = TaskSource::select(
        &state.cwd,
        &request.source.to_options(),
        state.deps.issues.clone(),
    );
    let kind = source.kind();
    match source.complete(task.trim()).await {
        Ok(outcome) => {
            let status = match outcome {
                CompleteOutcome::Updated => "updated",
                CompleteOutcome::AlreadyComplete => "already-complete",
                CompleteOutcome::NotFound => "not-found",
            };
            ok(json!({"status": status, "task": task.trim(), "source": kind}))
        }
        Err(err) => ok(json!({
            "status": "error",
            "source": kind,
            "message": err.to_string(),
        })),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RunSingleRequest {
    task: Option<String>,
    engine: Option<String>,
    skip_tests: bool,
    skip_lint: bool,
    auto_commit: Option<bool>,
    dry_run: bool,
    max_retries: Option<u32>,
    retry_delay: Option<u64>,
    prompt_mode: Option<String>,
    task_source: Option<String>,
    issue_body: Option<String>,
}

async fn run_single(
    State(state): State<AppState>,
    Json(request): Json<RunSingleRequest>,
) -> ApiResponse {
    let Some(task) = request.task.filter(|task| !task.trim().is_empty()) else {
        return bad_request("task is required");
    };
    let engine = match parse_engine(request.engine.as_deref()) {
        Ok(engine) => engine,
        Err(response) => return response,
    };

    let options = ExecOptions {
        engine,
        cwd: state.cwd.clone(),
        skip_tests: request.skip_tests,
        skip_lint: request.skip_lint,
        auto_commit: request.auto_commit.unwrap_or(true),
        dry_run: request.dry_run,
        max_retries: request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        retry_delay_secs: request.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
        prompt_mode: request.prompt_mode,
        task_source: request
            .task_source
            .as_deref()
            .and_then(parse_source_kind),
        issue_body: request.issue_body,
    };

    match execute_task(task.trim(), &options, state.deps.agent.as_ref()).await {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(value) => ok(value),
            Err(err) => internal_error(err),
        },
        Err(err) => internal_error(err),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RunPrdRequest {
    #[serde(flatten)]
    source: SourceParams,
    engine: Option<String>,
    max_iterations: Option<u32>,
    max_retries: Option<u32>,
    retry_delay: Option<u64>,
    skip_tests: bool,
    skip_lint: bool,
    auto_commit: Option<bool>,
    dry_run: bool,
    branch_per_task: bool,
    base_branch: Option<String>,
    create_pr: bool,
    draft_pr: bool,
    parallel: bool,
    max_parallel: Option<u32>,
}

async fn run_prd_handler(
    State(state): State<AppState>,
    Json(request): Json<RunPrdRequest>,
) -> ApiResponse {
    let engine = match parse_engine(request.engine.as_deref()) {
        Ok(engine) => engine,
        Err(response) => return response,
    };

    let options = PrdOptions {
        cwd: state.cwd.clone(),
        source: request.source.to_options(),
        engine,
        max_iterations: request.max_iterations,
        max_retries: request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        retry_delay_secs: request.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
        skip_tests: request.skip_tests,
        skip_lint: request.skip_lint,
        auto_commit: request.auto_commit.unwrap_or(true),
        dry_run: request.dry_run,
        branch_per_task: request.branch_per_task,
        base_branch: request.base_branch,
        create_pr: request.create_pr,
        draft_pr: request.draft_pr,
        parallel: request.parallel,
        max_parallel: request.max_parallel,
    };

    match run_prd(&options, &state.deps).await {
        Ok(result) => ok(result.to_json()),
        Err(err) => internal_error(err),
    }
}

fn parse_engine(name: Option<&str>) -> Result<Engine, ApiResponse> {
    match name {
        None => Ok(Engine::default()),
        Some(name) => {
            Engine::from_name(name).ok_or_else(|| bad_request(format!("unknown engine: {name}")))
        }
    }
}

fn parse_source_kind(name: &str) -> Option<SourceKind> {
    match name {
        "markdown" => Some(SourceKind::Markdown),
        "yaml" => Some(SourceKind::Yaml),
        "github" => Some(SourceKind::Github),
        _ => None,
    }
}
