//! Execution result models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Terminal status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
    TimedOut,
}

impl StepStatus {
    /// `failed` and `timed_out` are hard failures; skipped and passed are not
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::TimedOut)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Why a step did not pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CommandFailed,
    CommandTimeout,
    OptionalStepFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::CommandFailed => "command_failed",
            FailureReason::CommandTimeout => "command_timeout",
            FailureReason::OptionalStepFailed => "optional_step_failed",
        };
        f.write_str(s)
    }
}

/// Value of an extracted metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric when the text parses as a number
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => MetricValue::Number(n),
            _ => MetricValue::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// A (label, value) pair extracted from a step's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub label: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(label: impl Into<String>, value: MetricValue) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Finalized result of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub name: String,
    pub status: StepStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,

    pub attempts: u32,
    pub retried: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Exit code of the last attempt
    pub exit_code: Option<i32>,

    /// Spawn error of the last attempt, if the process never started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Captured output of the last attempt
    pub stdout: String,
    pub stderr: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
}

/// Aggregate counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub duration_ms: u64,
}

impl PipelineSummary {
    /// Count terminal statuses across executed steps
    pub fn from_results(results: &[StepResult], duration_ms: u64) -> Self {
        let mut summary = PipelineSummary {
            total: results.len(),
            duration_ms,
            ..Default::default()
        };

        for result in results {
            match result.status {
                StepStatus::Passed => summary.passed += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
                StepStatus::TimedOut => summary.timed_out += 1,
            }
        }

        summary
    }

    /// 1 iff any step failed or timed out
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 || self.timed_out > 0 {
            1
        } else {
            0
        }
    }
}

/// Result of one pipeline run. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub run_id: Uuid,
    pub steps: Vec<StepResult>,
    pub summary: PipelineSummary,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineRunResult {
    pub fn new(steps: Vec<StepResult>, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let summary = PipelineSummary::from_results(&steps, duration_ms);

        Self {
            run_id: Uuid::new_v4(),
            exit_code: summary.exit_code(),
            steps,
            summary,
            started_at,
            finished_at,
        }
    }

    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
