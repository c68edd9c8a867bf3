//! Test: Success Chain - steps run in order and the run passes

use crate::helpers::*;
use std::sync::Arc;
use taskline::core::{MetricValue, StepStatus};
use taskline::execution::ExecutionEngine;

#[tokio::test]
async fn test_single_passing_step() {
    let executor = Arc::new(ScriptedExecutor::new().script("echo ok", vec![pass("ok\n")]));
    let result = run_steps(executor, &[step("hello", "echo ok")], true).await;

    assert_step_status(&result, "hello", StepStatus::Passed);
    assert_eq!(result.exit_code, 0);
    assert!(result.is_success());

    let hello = result.step("hello").unwrap();
    assert_eq!(hello.attempts, 1);
    assert!(!hello.retried);
    assert_eq!(hello.reason, None);
    assert_eq!(hello.stdout, "ok\n");
}

#[tokio::test]
async fn test_steps_run_in_declared_order() {
    let yaml = r#"
name: "Chain"
steps:
  - id: "lint"
    command: "cargo clippy"
  - id: "build"
    command: "cargo build"
  - id: "test"
    command: "cargo test"
"#;

    let executor = Arc::new(ScriptedExecutor::new());
    let result = run_yaml(yaml, executor.clone(), false).await;

    assert_execution_order(&result, &["lint", "build", "test"]);
    assert_eq!(executor.calls(), vec!["cargo clippy", "cargo build", "cargo test"]);
    assert_eq!(result.summary.total, 3);
    assert_eq!(result.summary.passed, 3);
}

#[tokio::test]
async fn test_env_and_working_dir_are_merged_per_step() {
    let yaml = r#"
name: "Env"
working_dir: "/srv/app"
env:
  CI: "1"
  MODE: "base"
steps:
  - id: "a"
    command: "one"
  - id: "b"
    command: "two"
    working_dir: "web"
    env:
      MODE: "override"
"#;

    let executor = Arc::new(ScriptedExecutor::new());
    run_yaml(yaml, executor.clone(), false).await;

    let requests = executor.requests();
    assert_eq!(requests[0].working_dir, std::path::PathBuf::from("/srv/app"));
    assert_eq!(requests[0].env.get("MODE").map(String::as_str), Some("base"));

    assert_eq!(requests[1].working_dir, std::path::PathBuf::from("/srv/app/web"));
    assert_eq!(requests[1].env.get("MODE").map(String::as_str), Some("override"));
    assert_eq!(requests[1].env.get("CI").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_lifecycle_notifications_in_order() {
    let executor = Arc::new(ScriptedExecutor::new().script("b", vec![fail(2)]));
    let mut engine = ExecutionEngine::new(executor, options(true));
    let log = record_events(&mut engine);

    engine.execute(&[step("a", "a"), step("b", "b")]).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "pipeline_started:2",
            "step_started:a:0",
            "step_completed:a:0:passed",
            "step_started:b:1",
            "step_completed:b:1:failed",
            "pipeline_completed:1",
        ]
    );
}

#[tokio::test]
async fn test_metric_extracted_from_output() {
    let executor = Arc::new(ScriptedExecutor::new().script(
        "cargo test",
        vec![pass("test result: ok. 14 passed; 0 failed; 0 ignored")],
    ));
    let result = run_steps(executor, &[step("test", "cargo test")], true).await;

    let metric = result.step("test").unwrap().metric.clone().unwrap();
    assert_eq!(metric.label, "tests");
    assert_eq!(metric.value, MetricValue::Number(14.0));
}

#[tokio::test]
async fn test_run_result_serializes_snake_case() {
    let executor = Arc::new(ScriptedExecutor::new().script("slow", vec![timeout()]));
    let result = run_steps(executor, &[step("slow", "slow")], true).await;

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["exit_code"], 1);
    assert_eq!(json["steps"][0]["status"], "timed_out");
    assert_eq!(json["steps"][0]["reason"], "command_timeout");
    assert_eq!(json["summary"]["timed_out"], 1);
    assert!(json["run_id"].is_string());
}
