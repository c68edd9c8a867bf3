//! Test: Retry Behavior - attempts, delays and timeout retries

use crate::helpers::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskline::core::{FailureReason, RetryPolicy, StepStatus};
use taskline::execution::ExecutionEngine;

#[tokio::test]
async fn test_pass_on_second_attempt() {
    let yaml = r#"
name: "Retry"
steps:
  - id: "flaky"
    command: "flaky"
    retry:
      max_attempts: 2
"#;

    let executor = Arc::new(ScriptedExecutor::new().script("flaky", vec![fail(1), pass("ok")]));
    let result = run_yaml(yaml, executor.clone(), false).await;

    let flaky = result.step("flaky").unwrap();
    assert_eq!(flaky.status, StepStatus::Passed);
    assert!(flaky.retried);
    assert_eq!(flaky.attempts, 2);
    assert_eq!(flaky.stdout, "ok");
    assert_eq!(executor.call_count("flaky"), 2);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let executor = Arc::new(ScriptedExecutor::new().script("broken", vec![fail(3)]));
    let result = run_steps(
        executor.clone(),
        &[step("broken", "broken").with_retry(RetryPolicy::attempts(3))],
        true,
    )
    .await;

    let broken = result.step("broken").unwrap();
    assert_eq!(broken.status, StepStatus::Failed);
    assert_eq!(broken.reason, Some(FailureReason::CommandFailed));
    assert_eq!(broken.attempts, 3);
    assert_eq!(broken.exit_code, Some(3));
    assert_eq!(executor.call_count("broken"), 3);
}

#[tokio::test]
async fn test_timeout_retried_only_when_enabled() {
    let executor = Arc::new(ScriptedExecutor::new().script("slow", vec![timeout()]));
    let steps = [
        step("default", "slow").with_retry(RetryPolicy::attempts(3)),
        step("enabled", "slow").with_retry(RetryPolicy::attempts(3).retry_on_timeout(true)),
    ];
    let result = run_steps(executor.clone(), &steps, true).await;

    assert_eq!(result.step("default").unwrap().attempts, 1);
    assert_eq!(result.step("enabled").unwrap().attempts, 3);
    assert_eq!(executor.call_count("slow"), 4);
    assert_eq!(result.summary.timed_out, 2);
}

#[tokio::test]
async fn test_retry_delay_and_notifications() {
    let executor = Arc::new(ScriptedExecutor::new().script(
        "flaky",
        vec![fail(1), fail(1), pass("")],
    ));
    let mut engine = ExecutionEngine::new(executor, options(true));
    let log = record_events(&mut engine);

    let policy = RetryPolicy::attempts(3).with_delay(Duration::from_millis(30));
    let started = Instant::now();
    let result = engine.execute(&[step("flaky", "flaky").with_retry(policy)]).await;

    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(result.step("flaky").unwrap().attempts, 3);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "pipeline_started:1",
            "step_started:flaky:0",
            "step_retrying:flaky:2",
            "step_retrying:flaky:3",
            "step_completed:flaky:0:passed",
            "pipeline_completed:0",
        ]
    );
}

#[tokio::test]
async fn test_pipeline_retry_default_applies_to_steps() {
    let yaml = r#"
name: "Defaults"
retry:
  max_attempts: 2
steps:
  - id: "a"
    command: "broken"
  - id: "b"
    command: "broken"
    retry:
      max_attempts: 1
"#;

    let executor = Arc::new(ScriptedExecutor::new().script("broken", vec![fail(1)]));
    let result = run_yaml(yaml, executor, false).await;

    assert_eq!(result.step("a").unwrap().attempts, 2);
    assert_eq!(result.step("b").unwrap().attempts, 1);
}
