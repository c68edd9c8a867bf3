//! Watch scheduler - debounced, non-overlapping reruns
//!
//! A single event loop owns all scheduling state. File system callbacks only
//! forward messages into it, so the running/pending flags never race.

use crate::{
    core::StepDefinition,
    execution::{CommandExecutor, ExecutionEngine},
    watch::{PathFilter, WatchError},
};
use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Quiet period after the last relevant change before a rerun is requested
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(250);

/// Something that performs one pipeline run and reports its exit code
#[async_trait]
pub trait RunTrigger: Send + Sync + 'static {
    async fn run(&self) -> i32;
}

/// A configured engine plus the steps it runs
pub struct PipelineJob<E> {
    engine: ExecutionEngine<E>,
    steps: Vec<StepDefinition>,
}

impl<E> PipelineJob<E> {
    pub fn new(engine: ExecutionEngine<E>, steps: Vec<StepDefinition>) -> Self {
        Self { engine, steps }
    }
}

#[async_trait]
impl<E: CommandExecutor + 'static> RunTrigger for PipelineJob<E> {
    async fn run(&self) -> i32 {
        self.engine.execute(&self.steps).await.exit_code
    }
}

/// Notifications emitted by the watch loop
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    ChangeDetected { path: PathBuf },
    /// A rerun was requested while a run was active
    RerunQueued,
    RunStarted { run: usize },
    RunFinished { run: usize, exit_code: i32 },
    /// File watching failed; no further reruns will be scheduled
    Fallback { reason: String },
    Stopped { exit_code: i32 },
}

/// How a watch session ended
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOutcome {
    /// Exit code of the last completed run, 0 if none completed
    pub exit_code: i32,

    /// False when file watching could not be established or broke down
    pub supported: bool,

    pub fallback_reason: Option<String>,
}

/// What the loop should do after a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Idle,
    StartRun,
}

/// Scheduling state, free of any I/O
#[derive(Debug, Default)]
pub struct WatchState {
    running: bool,
    rerun_pending: bool,
    stopped: bool,
    last_exit_code: Option<i32>,
    debounce_deadline: Option<Instant>,
}

impl WatchState {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn rerun_pending(&self) -> bool {
        self.rerun_pending
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce_deadline
    }

    /// Start a run now, or remember that one is owed
    pub fn request_run(&mut self) -> Action {
        if self.stopped {
            Action::Idle
        } else if self.running {
            self.rerun_pending = true;
            Action::Idle
        } else {
            self.running = true;
            Action::StartRun
        }
    }

    /// A relevant change restarts the debounce window
    pub fn on_change(&mut self, now: Instant, delay: Duration) {
        if !self.stopped {
            self.debounce_deadline = Some(now + delay);
        }
    }

    pub fn on_debounce_elapsed(&mut self) -> Action {
        self.debounce_deadline = None;
        self.request_run()
    }

    pub fn on_run_finished(&mut self, exit_code: i32) -> Action {
        self.running = false;
        self.last_exit_code = Some(exit_code);

        if self.rerun_pending && !self.stopped {
            self.rerun_pending = false;
            self.running = true;
            Action::StartRun
        } else {
            Action::Idle
        }
    }

    /// No new runs after this point; an active run is left to finish
    pub fn stop(&mut self) {
        self.stopped = true;
        self.rerun_pending = false;
        self.debounce_deadline = None;
    }
}

/// Messages forwarded from the file system watcher
#[derive(Debug)]
enum WatchMessage {
    Changed(Vec<PathBuf>),
    Failed(String),
}

type WatchHandler = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

/// Drives repeated pipeline runs from file system changes
pub struct WatchScheduler<T> {
    filter: PathFilter,
    trigger: Arc<T>,
    debounce: Duration,
    handlers: Vec<WatchHandler>,
}

impl<T: RunTrigger> WatchScheduler<T> {
    pub fn new(root: impl Into<PathBuf>, trigger: T, exclude: &[String]) -> Result<Self, WatchError> {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);

        Ok(Self {
            filter: PathFilter::new(root, exclude)?,
            trigger: Arc::new(trigger),
            debounce: DEBOUNCE_DELAY,
            handlers: Vec::new(),
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&WatchEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    fn emit(&self, event: WatchEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    /// Run once immediately, then rerun on relevant changes until `stop` fires
    pub async fn run(self, stop: CancellationToken) -> WatchOutcome {
        let (tx, rx) = mpsc::unbounded_channel();

        match start_watcher(self.filter.root(), tx) {
            Ok(watcher) => {
                info!(root = %self.filter.root().display(), "Watching for changes");
                self.event_loop(rx, Some(watcher), stop).await
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(error = %reason, "File watching unavailable, running once");
                self.emit(WatchEvent::Fallback {
                    reason: reason.clone(),
                });

                self.emit(WatchEvent::RunStarted { run: 1 });
                let exit_code = self.trigger.run().await;
                self.emit(WatchEvent::RunFinished { run: 1, exit_code });

                WatchOutcome {
                    exit_code,
                    supported: false,
                    fallback_reason: Some(reason),
                }
            }
        }
    }

    fn spawn_run(&self, run: usize) -> JoinHandle<i32> {
        info!(run, "Starting pipeline run");
        self.emit(WatchEvent::RunStarted { run });

        let trigger = Arc::clone(&self.trigger);
        tokio::spawn(async move { trigger.run().await })
    }

    /// `watcher` is held only to keep file notifications alive
    async fn event_loop<W>(
        &self,
        mut rx: UnboundedReceiver<WatchMessage>,
        mut watcher: Option<W>,
        stop: CancellationToken,
    ) -> WatchOutcome {
        let mut state = WatchState::default();
        let mut in_flight: Option<JoinHandle<i32>> = None;
        let mut runs = 0usize;
        let mut channel_open = true;
        let mut fallback_reason: Option<String> = None;

        if state.request_run() == Action::StartRun {
            runs += 1;
            in_flight = Some(self.spawn_run(runs));
        }

        loop {
            let deadline = state.debounce_deadline();

            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    state.stop();
                    drop(watcher.take());
                    let exit_code = state.last_exit_code().unwrap_or(0);
                    info!(exit_code, active_run = in_flight.is_some(), "Watch mode stopped");
                    self.emit(WatchEvent::Stopped { exit_code });
                    return WatchOutcome {
                        exit_code,
                        supported: fallback_reason.is_none(),
                        fallback_reason,
                    };
                }

                joined = join_run(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    let exit_code = match joined {
                        Ok(code) => code,
                        Err(e) => {
                            warn!(error = %e, "Pipeline run task failed");
                            1
                        }
                    };
                    info!(run = runs, exit_code, "Pipeline run finished");
                    self.emit(WatchEvent::RunFinished { run: runs, exit_code });

                    if state.on_run_finished(exit_code) == Action::StartRun {
                        runs += 1;
                        in_flight = Some(self.spawn_run(runs));
                    } else if fallback_reason.is_some() {
                        return WatchOutcome {
                            exit_code,
                            supported: false,
                            fallback_reason,
                        };
                    }
                }

                message = rx.recv(), if channel_open => match message {
                    Some(WatchMessage::Changed(paths)) => {
                        let mut relevant = false;
                        for path in paths {
                            if self.filter.is_ignored(&path) {
                                debug!(path = %path.display(), "Ignoring change");
                                continue;
                            }
                            debug!(path = %path.display(), "Change detected");
                            self.emit(WatchEvent::ChangeDetected { path });
                            relevant = true;
                        }
                        if relevant {
                            state.on_change(Instant::now(), self.debounce);
                        }
                    }
                    Some(WatchMessage::Failed(reason)) => {
                        warn!(error = %reason, "File watcher failed, no further reruns");
                        state.stop();
                        drop(watcher.take());
                        self.emit(WatchEvent::Fallback { reason: reason.clone() });

                        if in_flight.is_none() {
                            return WatchOutcome {
                                exit_code: state.last_exit_code().unwrap_or(0),
                                supported: false,
                                fallback_reason: Some(reason),
                            };
                        }
                        fallback_reason = Some(reason);
                    }
                    None => channel_open = false,
                },

                _ = sleep_until(deadline), if deadline.is_some() => {
                    if state.on_debounce_elapsed() == Action::StartRun {
                        runs += 1;
                        in_flight = Some(self.spawn_run(runs));
                    } else {
                        debug!("Run in progress, rerun queued");
                        self.emit(WatchEvent::RerunQueued);
                    }
                }
            }
        }
    }
}

async fn join_run(handle: &mut Option<JoinHandle<i32>>) -> Result<i32, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn start_watcher(
    root: &Path,
    tx: UnboundedSender<WatchMessage>,
) -> Result<RecommendedWatcher, WatchError> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let message = match res {
            // reads by the pipeline itself must not retrigger it
            Ok(event) if matches!(event.kind, EventKind::Access(_)) => return,
            Ok(event) => WatchMessage::Changed(event.paths),
            Err(e) => WatchMessage::Failed(e.to_string()),
        };
        let _ = tx.send(message);
    })?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}
