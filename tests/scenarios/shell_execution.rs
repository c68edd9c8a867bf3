//! Test: Shell Execution - real processes through the platform shell
#![cfg(unix)]

use std::time::{Duration, Instant};
use taskline::core::config::PipelineConfig;
use taskline::core::{FailureReason, StepDefinition, StepStatus};
use taskline::execution::{ExecutionEngine, RunOptions, ShellExecutor};

fn engine(dir: &std::path::Path, continue_on_error: bool) -> ExecutionEngine<ShellExecutor> {
    ExecutionEngine::new(
        ShellExecutor::new(),
        RunOptions {
            continue_on_error,
            base_dir: dir.to_path_buf(),
            ..RunOptions::default()
        },
    )
}

#[tokio::test]
async fn test_timeout_kills_long_running_command() {
    let dir = tempfile::tempdir().unwrap();
    let step = StepDefinition::new("slow", "sleep 0.4").with_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let result = engine(dir.path(), true).execute(&[step]).await;

    let slow = result.step("slow").unwrap();
    assert_eq!(slow.status, StepStatus::TimedOut);
    assert_eq!(slow.reason, Some(FailureReason::CommandTimeout));
    assert_eq!(result.exit_code, 1);
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn test_timeout_reaches_grandchildren() {
    let dir = tempfile::tempdir().unwrap();
    let step = StepDefinition::new("nested", "sh -c 'sleep 5' & wait")
        .with_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let result = engine(dir.path(), true).execute(&[step]).await;

    assert_eq!(result.steps[0].status, StepStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_yaml_pipeline_against_real_shell() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let yaml = r#"
name: "Real"
env:
  GREETING: "hello"
steps:
  - id: "write"
    command: "printf '%s' \"$GREETING\" > out.txt"
  - id: "read"
    command: "cat ../out.txt && pwd"
    working_dir: "sub"
  - id: "flaky"
    command: "test -f marker || { touch marker; exit 1; }"
    retry:
      max_attempts: 2
  - id: "optional"
    command: "exit 4"
    optional: true
  - id: "score"
    command: "echo 'metric: score=9.5'"
"#;

    let config = PipelineConfig::from_yaml(yaml).unwrap();
    let options = RunOptions {
        continue_on_error: true,
        base_dir: config.base_dir(dir.path()),
        base_env: config.env.clone(),
    };
    let result = ExecutionEngine::new(ShellExecutor::new(), options)
        .execute(&config.step_definitions())
        .await;

    let read = result.step("read").unwrap();
    assert_eq!(read.status, StepStatus::Passed);
    assert!(read.stdout.starts_with("hello"));
    assert!(read.stdout.trim_end().ends_with("sub"));

    let flaky = result.step("flaky").unwrap();
    assert_eq!(flaky.status, StepStatus::Passed);
    assert_eq!(flaky.attempts, 2);

    let optional = result.step("optional").unwrap();
    assert_eq!(optional.status, StepStatus::Skipped);
    assert_eq!(optional.exit_code, Some(4));

    let metric = result.step("score").unwrap().metric.clone().unwrap();
    assert_eq!(metric.label, "score");

    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_missing_working_dir_fails_step() {
    let dir = tempfile::tempdir().unwrap();
    let step = StepDefinition::new("lost", "true").with_working_dir("does-not-exist");

    let result = engine(dir.path(), true).execute(&[step]).await;

    let lost = result.step("lost").unwrap();
    assert_eq!(lost.status, StepStatus::Failed);
    assert_eq!(lost.reason, Some(FailureReason::CommandFailed));
    assert!(lost.error.is_some());
}
