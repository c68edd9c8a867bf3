//! Pipeline runner - orchestrates a sequential run of steps

use crate::{
    core::{PipelineRunResult, StepDefinition, StepResult},
    execution::{CommandExecutor, MetricResolver, StepContext, StepController},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        steps: Vec<StepDefinition>,
    },
    StepStarted {
        step: StepDefinition,
        index: usize,
    },
    StepRetrying {
        step_id: String,
        attempt: u32,
        delay: Duration,
    },
    StepCompleted {
        result: StepResult,
        index: usize,
    },
    PipelineCompleted {
        result: PipelineRunResult,
    },
}

/// Receives lifecycle events; each call is awaited before the run continues
#[async_trait]
pub trait PipelineObserver: Send + Sync {
    async fn on_event(&self, event: &ExecutionEvent);
}

/// Adapter for plain closures
struct HandlerObserver<F>(F);

#[async_trait]
impl<F> PipelineObserver for HandlerObserver<F>
where
    F: Fn(&ExecutionEvent) + Send + Sync,
{
    async fn on_event(&self, event: &ExecutionEvent) {
        (self.0)(event)
    }
}

/// Run-wide settings supplied by the configuration layer
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Keep going after a hard failure
    pub continue_on_error: bool,

    /// Base working directory for every step
    pub base_dir: PathBuf,

    /// Base environment for every step
    pub base_env: HashMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            base_env: HashMap::new(),
        }
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<E> {
    executor: E,
    resolver: MetricResolver,
    options: RunOptions,
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl<E: CommandExecutor> ExecutionEngine<E> {
    pub fn new(executor: E, options: RunOptions) -> Self {
        Self {
            executor,
            resolver: MetricResolver::default(),
            options,
            observers: Vec::new(),
        }
    }

    /// Replace the metric resolver
    pub fn with_resolver(mut self, resolver: MetricResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Add an observer
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add an event handler closure
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(HandlerObserver(handler)));
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Emit an event to all observers, in registration order
    async fn emit_event(&self, event: ExecutionEvent) {
        for observer in &self.observers {
            observer.on_event(&event).await;
        }
    }

    /// Execute the steps in declared order and build the run result
    pub async fn execute(&self, steps: &[StepDefinition]) -> PipelineRunResult {
        let started_at = Utc::now();

        info!(
            steps = steps.len(),
            continue_on_error = self.options.continue_on_error,
            "Starting pipeline run"
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            steps: steps.to_vec(),
        })
        .await;

        let controller = StepController::new(
            &self.executor,
            StepContext {
                base_dir: &self.options.base_dir,
                base_env: &self.options.base_env,
                resolver: &self.resolver,
            },
        );

        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            info!(step_id = %step.id, index, "Executing step");
            self.emit_event(ExecutionEvent::StepStarted {
                step: step.clone(),
                index,
            })
            .await;

            let result = controller
                .run(step, move |attempt, delay| {
                    self.emit_event(ExecutionEvent::StepRetrying {
                        step_id: step.id.clone(),
                        attempt,
                        delay,
                    })
                })
                .await;

            let hard_failure = result.status.is_hard_failure();

            self.emit_event(ExecutionEvent::StepCompleted {
                result: result.clone(),
                index,
            })
            .await;
            results.push(result);

            if hard_failure && !self.options.continue_on_error {
                warn!(
                    step_id = %step.id,
                    remaining = steps.len() - index - 1,
                    "Hard failure with fail-fast, stopping pipeline"
                );
                break;
            }
        }

        let result = PipelineRunResult::new(results, started_at, Utc::now());

        info!(
            passed = result.summary.passed,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            timed_out = result.summary.timed_out,
            duration_ms = result.summary.duration_ms,
            exit_code = result.exit_code,
            "Pipeline run finished"
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            result: result.clone(),
        })
        .await;

        result
    }
}
