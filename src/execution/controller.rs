//! Retry/timeout controller - drives the attempt loop for one step

use crate::{
    core::{FailureReason, StepDefinition, StepResult, StepStatus},
    execution::{CommandExecutor, CommandRequest, ExecutionOutcome, MetricResolver},
};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shared inputs for every step of a run
pub struct StepContext<'a> {
    pub base_dir: &'a Path,
    pub base_env: &'a HashMap<String, String>,
    pub resolver: &'a MetricResolver,
}

/// Runs a step under its retry policy and classifies the final outcome
pub struct StepController<'a, E: ?Sized> {
    executor: &'a E,
    context: StepContext<'a>,
}

impl<'a, E: CommandExecutor + ?Sized> StepController<'a, E> {
    pub fn new(executor: &'a E, context: StepContext<'a>) -> Self {
        Self { executor, context }
    }

    /// Execute the step until it passes or its retries are exhausted
    ///
    /// `on_retry` is awaited with the upcoming attempt number and the delay
    /// before each retry.
    pub async fn run<F, Fut>(&self, step: &StepDefinition, mut on_retry: F) -> StepResult
    where
        F: FnMut(u32, Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let started = Instant::now();

        let request = CommandRequest {
            command: step.command.clone(),
            working_dir: step.effective_working_dir(self.context.base_dir),
            env: step.effective_env(self.context.base_env),
            timeout: step.timeout,
        };

        let max_attempts = step.retry.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut last: Option<ExecutionOutcome> = None;
        let mut classified: Option<(StepStatus, Option<FailureReason>)> = None;

        while attempts < max_attempts {
            let outcome = self.executor.execute(&request).await;
            attempts += 1;

            if outcome.successful {
                info!(step_id = %step.id, attempts, "step passed");
                last = Some(outcome);
                classified = Some((StepStatus::Passed, None));
                break;
            }

            warn!(
                step_id = %step.id,
                attempt = attempts,
                max_attempts,
                exit_code = ?outcome.exit_code,
                timed_out = outcome.timed_out,
                error = ?outcome.error,
                "attempt failed"
            );

            if step.retry.allows_retry(attempts, outcome.timed_out) {
                last = Some(outcome);
                on_retry(attempts + 1, step.retry.delay).await;
                if !step.retry.delay.is_zero() {
                    tokio::time::sleep(step.retry.delay).await;
                }
                continue;
            }

            classified = Some(classify_failure(step, outcome.timed_out));
            last = Some(outcome);
            break;
        }

        // only reachable if the loop ran out without classifying
        let (status, reason) =
            classified.unwrap_or((StepStatus::Failed, Some(FailureReason::CommandFailed)));
        let outcome = last.unwrap_or_else(ExecutionOutcome::zeroed);

        if status != StepStatus::Passed {
            info!(step_id = %step.id, %status, attempts, "step finished without passing");
        }

        let combined = format!("{}\n{}", outcome.stdout, outcome.stderr);
        let metric = self.context.resolver.resolve(step, &combined);

        StepResult {
            id: step.id.clone(),
            name: step.name.clone(),
            status,
            reason,
            attempts,
            retried: attempts > 1,
            started_at,
            finished_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            exit_code: outcome.exit_code,
            error: outcome.error,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            metric,
        }
    }
}

/// Optional-ness dominates timeout classification
pub fn classify_failure(step: &StepDefinition, timed_out: bool) -> (StepStatus, Option<FailureReason>) {
    if step.optional {
        (StepStatus::Skipped, Some(FailureReason::OptionalStepFailed))
    } else if timed_out {
        (StepStatus::TimedOut, Some(FailureReason::CommandTimeout))
    } else {
        (StepStatus::Failed, Some(FailureReason::CommandFailed))
    }
}
