//! Typed outcomes for PRD runs.
//!
//! Failures during a run are reported structurally, tagged with the stage
//! that failed, rather than thrown; infrastructure errors are converted into
//! the matching stage failure at the adapter boundary.

use serde::Serialize;

use crate::core::task::SourceKind;
use crate::core::usage::Usage;

/// Stage at which a PRD run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    TaskSource,
    Agent,
    Complete,
    Pr,
    Merge,
}

/// Per-task execution status in a run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// One attempted task, appended in the order tasks were attempted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub task: String,
    pub source: SourceKind,
    pub status: RunStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a run stopped without a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    NoTasks,
    MaxIterations,
}

/// A stage failure and the task it happened on, where applicable.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

impl StageFailure {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            task: None,
        }
    }

    pub fn for_task(stage: Stage, message: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            task: Some(task.into()),
        }
    }
}

/// How a run ended: cleanly stopped, or failed at a stage.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunOutcome {
    #[serde(rename = "ok")]
    Ok { stopped: StopReason },
    #[serde(rename = "error")]
    Error {
        #[serde(flatten)]
        failure: StageFailure,
    },
}

/// Full report of a PRD run: outcome plus accumulated state.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub iterations: u32,
    pub completed: u32,
    pub tasks: Vec<RunRecord>,
    pub usage: Usage,
}

impl RunReport {
    pub fn stopped(reason: StopReason) -> Self {
        Self {
            outcome: RunOutcome::Ok { stopped: reason },
            iterations: 0,
            completed: 0,
            tasks: Vec::new(),
            usage: Usage::default(),
        }
    }

    pub fn failed(failure: StageFailure) -> Self {
        Self {
            outcome: RunOutcome::Error { failure },
            iterations: 0,
            completed: 0,
            tasks: Vec::new(),
            usage: Usage::default(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, RunOutcome::Ok { .. })
    }
}

/// Result of a PRD run request: pre-flight rejection or a full report.
#[derive(Debug, Clone)]
pub enum PrdResult {
    /// Requirements failed before any work started.
    Preflight(Vec<String>),
    Report(RunReport),
}

impl PrdResult {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PrdResult::Preflight(failures) => serde_json::json!({
                "status": "error",
                "failures": failures,
            }),
            PrdResult::Report(report) => {
                serde_json::to_value(report).unwrap_or_else(|_| serde_json::json!(null))
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PrdResult::Report(report) if report.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_report_serializes_with_status_and_stop_reason() {
        let report = RunReport::stopped(StopReason::MaxIterations);
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["stopped"], "max-iterations");
        assert_eq!(json["iterations"], 0);
        assert_eq!(json["usage"]["inputTokens"], 0);
    }

    #[test]
    fn failed_report_carries_stage_and_task() {
        let report = RunReport::failed(StageFailure::for_task(
            Stage::Agent,
            "Empty response from agent",
            "First task",
        ));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["status"], "error");
        assert_eq!(json["stage"], "agent");
        assert_eq!(json["task"], "First task");
    }

    #[test]
    fn preflight_result_lists_failures() {
        let result = PrdResult::Preflight(vec!["no .git directory".to_string()]);
        let json = result.to_json();
        assert_eq!(json["status"], "error");
        assert_eq!(json["failures"][0], "no .git directory");
    }
}
