//! Test: Failure Handling - optional steps, fail-fast and continue-on-error

use crate::helpers::*;
use std::sync::Arc;
use taskline::core::{FailureReason, StepStatus};

#[tokio::test]
async fn test_optional_failure_is_skipped() {
    let executor = Arc::new(ScriptedExecutor::new().script("flaky", vec![fail(1)]));
    let result = run_steps(executor, &[step("flaky", "flaky").optional(true)], true).await;

    assert_step_status(&result, "flaky", StepStatus::Skipped);
    assert_eq!(
        result.step("flaky").unwrap().reason,
        Some(FailureReason::OptionalStepFailed)
    );
    assert_eq!(result.summary.skipped, 1);
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_fail_fast_drops_remaining_steps() {
    let yaml = r#"
name: "Fail fast"
continue_on_error: false
steps:
  - id: "first"
    command: "broken"
  - id: "second"
    command: "never"
"#;

    let executor = Arc::new(ScriptedExecutor::new().script("broken", vec![fail(1)]));
    let result = run_yaml(yaml, executor.clone(), false).await;

    assert_execution_order(&result, &["first"]);
    assert_step_status(&result, "first", StepStatus::Failed);
    assert!(result.step("second").is_none());
    assert_eq!(executor.call_count("never"), 0);
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn test_fail_fast_flag_overrides_configured_default() {
    let yaml = r#"
name: "Configured to continue"
continue_on_error: true
steps:
  - id: "first"
    command: "broken"
  - id: "second"
    command: "fine"
"#;

    let executor = Arc::new(ScriptedExecutor::new().script("broken", vec![fail(1)]));
    let result = run_yaml(yaml, executor, true).await;

    assert_execution_order(&result, &["first"]);
}

#[tokio::test]
async fn test_continue_on_error_is_the_default() {
    let yaml = r#"
name: "Default"
steps:
  - id: "first"
    command: "broken"
  - id: "second"
    command: "fine"
"#;

    let executor = Arc::new(ScriptedExecutor::new().script("broken", vec![fail(1)]));
    let result = run_yaml(yaml, executor, false).await;

    assert_execution_order(&result, &["first", "second"]);
    assert_step_status(&result, "second", StepStatus::Passed);
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn test_timeout_is_a_hard_failure_for_fail_fast() {
    let executor = Arc::new(ScriptedExecutor::new().script("slow", vec![timeout()]));
    let result = run_steps(
        executor,
        &[step("slow", "slow"), step("after", "after")],
        false,
    )
    .await;

    assert_execution_order(&result, &["slow"]);
    assert_step_status(&result, "slow", StepStatus::TimedOut);
    assert_eq!(
        result.step("slow").unwrap().reason,
        Some(FailureReason::CommandTimeout)
    );
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn test_skipped_step_does_not_trigger_fail_fast() {
    let executor = Arc::new(ScriptedExecutor::new().script("lint", vec![fail(1)]));
    let result = run_steps(
        executor,
        &[step("lint", "lint").optional(true), step("build", "build")],
        false,
    )
    .await;

    assert_execution_order(&result, &["lint", "build"]);
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_optional_timeout_is_skipped() {
    let executor = Arc::new(ScriptedExecutor::new().script("slow", vec![timeout()]));
    let result = run_steps(executor, &[step("slow", "slow").optional(true)], false).await;

    assert_step_status(&result, "slow", StepStatus::Skipped);
    assert_eq!(
        result.step("slow").unwrap().reason,
        Some(FailureReason::OptionalStepFailed)
    );
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_spawn_error_is_a_command_failure() {
    let executor = Arc::new(ScriptedExecutor::new().script(
        "missing",
        vec![taskline::execution::ExecutionOutcome::spawn_failed(
            "No such file or directory",
        )],
    ));
    let result = run_steps(executor, &[step("missing", "missing")], true).await;

    let missing = result.step("missing").unwrap();
    assert_eq!(missing.status, StepStatus::Failed);
    assert_eq!(missing.reason, Some(FailureReason::CommandFailed));
    assert_eq!(missing.error.as_deref(), Some("No such file or directory"));
    assert_eq!(result.exit_code, 1);
}
