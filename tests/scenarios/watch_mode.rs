//! Test: Watch Mode - reruns driven by real file system events

use crate::helpers::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taskline::execution::ExecutionEngine;
use taskline::watch::{PipelineJob, RunTrigger, WatchEvent, WatchScheduler};
use tokio_util::sync::CancellationToken;

struct Counter {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl RunTrigger for Counter {
    async fn run(&self) -> i32 {
        self.runs.fetch_add(1, Ordering::SeqCst);
        0
    }
}

#[tokio::test]
async fn test_file_change_triggers_rerun() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::create_dir(dir.path().join("target")).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let mut scheduler = WatchScheduler::new(
        dir.path(),
        Counter { runs: runs.clone() },
        &["*.tmp".to_string()],
    )
    .unwrap();
    scheduler.add_event_handler(move |event| sink.lock().unwrap().push(event.clone()));

    let stop = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(stop.clone()));

    sleep_ms(300).await;
    std::fs::write(dir.path().join("target").join("ignored.bin"), "x").unwrap();
    std::fs::write(dir.path().join("scratch.tmp"), "x").unwrap();
    sleep_ms(600).await;
    let after_ignored = runs.load(Ordering::SeqCst);

    std::fs::write(dir.path().join("src").join("lib.rs"), "// changed").unwrap();
    sleep_ms(1000).await;

    stop.cancel();
    let outcome = handle.await.unwrap();

    if !outcome.supported {
        eprintln!(
            "file watching unavailable here: {:?}",
            outcome.fallback_reason
        );
        return;
    }

    assert_eq!(after_ignored, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.exit_code, 0);

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, WatchEvent::ChangeDetected { path } if path.ends_with("lib.rs"))));
    assert!(matches!(events.last(), Some(WatchEvent::Stopped { exit_code: 0 })));
}

#[tokio::test]
async fn test_pipeline_job_reports_run_exit_code() {
    let executor = Arc::new(ScriptedExecutor::new().script("broken", vec![fail(1)]));
    let engine = ExecutionEngine::new(executor.clone(), options(true));
    let job = PipelineJob::new(engine, vec![step("a", "broken"), step("b", "fine")]);

    assert_eq!(job.run().await, 1);
    assert_eq!(executor.calls(), vec!["broken", "fine"]);
}
