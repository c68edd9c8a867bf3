//! CLI output formatting

use crate::{
    core::{PipelineRunResult, StepResult, StepStatus},
    execution::{ExecutionEvent, PipelineObserver},
    watch::WatchEvent,
};
use async_trait::async_trait;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏰ ", "T ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static EYES: Emoji<'_, '_> = Emoji("👀 ", "* ");

/// Create a spinner for a running step
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} {elapsed:.dim}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Horizontal rule spanning the terminal width
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    "─".repeat(width)
}

pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Format a step status for display
pub fn format_status(status: StepStatus) -> String {
    match status {
        StepStatus::Passed => style("PASSED").green().to_string(),
        StepStatus::Failed => style("FAILED").red().to_string(),
        StepStatus::Skipped => style("SKIPPED").dim().to_string(),
        StepStatus::TimedOut => style("TIMED OUT").yellow().to_string(),
    }
}

fn status_icon(status: StepStatus) -> Emoji<'static, 'static> {
    match status {
        StepStatus::Passed => CHECK,
        StepStatus::Failed => CROSS,
        StepStatus::Skipped => SKIP,
        StepStatus::TimedOut => CLOCK,
    }
}

/// Spinner message for a step that just started
pub fn format_step_started(name: &str, index: usize, total: usize) -> String {
    format!(
        "{}[{}/{}] {}",
        SPINNER,
        style(index + 1).cyan(),
        style(total).dim(),
        style(name).bold()
    )
}

/// One line per finished step: icon, name, status, duration, metric
pub fn format_step_result(result: &StepResult) -> String {
    let mut line = format!(
        "{}{} {} {}",
        status_icon(result.status),
        style(&result.name).bold(),
        format_status(result.status),
        style(format_duration_ms(result.duration_ms)).dim()
    );

    if result.retried {
        line.push_str(&format!(" {}", style(format!("({} attempts)", result.attempts)).dim()));
    }
    if let Some(metric) = &result.metric {
        line.push_str(&format!(" {}", style(format!("[{}: {}]", metric.label, metric.value)).cyan()));
    }
    line
}

/// Final tally of a run
pub fn format_summary(result: &PipelineRunResult) -> String {
    let s = &result.summary;
    let mut parts = vec![style(format!("{} passed", s.passed)).green().to_string()];
    if s.failed > 0 {
        parts.push(style(format!("{} failed", s.failed)).red().to_string());
    }
    if s.timed_out > 0 {
        parts.push(style(format!("{} timed out", s.timed_out)).yellow().to_string());
    }
    if s.skipped > 0 {
        parts.push(style(format!("{} skipped", s.skipped)).dim().to_string());
    }

    let icon = if result.is_success() { CHECK } else { CROSS };
    format!(
        "{}{} of {} steps: {} in {}",
        icon,
        style("Finished").bold(),
        s.total,
        parts.join(", "),
        format_duration_ms(s.duration_ms)
    )
}

/// Format step output with truncation, keeping the last lines
pub fn format_output_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        lines.join("\n")
    } else {
        format!(
            "{}\n{}",
            style(format!("... ({} earlier lines)", lines.len() - max_lines)).dim(),
            lines[lines.len() - max_lines..].join("\n")
        )
    }
}

pub fn format_watch_event(event: &WatchEvent) -> Option<String> {
    match event {
        WatchEvent::ChangeDetected { path } => Some(format!(
            "{}Change detected: {}",
            EYES,
            style(path.display()).dim()
        )),
        WatchEvent::RerunQueued => Some(format!("{}Run in progress, rerun queued", INFO)),
        WatchEvent::RunStarted { run } if *run > 1 => {
            Some(format!("\n{}Rerun #{}", ROCKET, style(run - 1).cyan()))
        }
        WatchEvent::RunStarted { .. } | WatchEvent::RunFinished { .. } => None,
        WatchEvent::Fallback { reason } => Some(format!(
            "{}File watching unavailable ({}), no further reruns",
            WARN,
            style(reason).yellow()
        )),
        WatchEvent::Stopped { exit_code } => Some(format!(
            "{}Watch mode stopped (exit code {})",
            INFO, exit_code
        )),
    }
}

/// Human-readable progress on stdout
pub struct PrettyReporter {
    pipeline_name: String,
    total: Mutex<usize>,
    spinner: Mutex<Option<ProgressBar>>,
}

impl PrettyReporter {
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            total: Mutex::new(0),
            spinner: Mutex::new(None),
        }
    }

    fn with_spinner(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        match self.spinner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(e) => warn!(error = %e, "spinner state poisoned"),
        }
    }
}

#[async_trait]
impl PipelineObserver for PrettyReporter {
    async fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::PipelineStarted { steps } => {
                if let Ok(mut total) = self.total.lock() {
                    *total = steps.len();
                }
                println!(
                    "{}Running {} ({} steps)",
                    ROCKET,
                    style(&self.pipeline_name).bold(),
                    steps.len()
                );
            }
            ExecutionEvent::StepStarted { step, index } => {
                let total = self.total.lock().map(|t| *t).unwrap_or(0);
                let message = format_step_started(&step.name, *index, total);
                self.with_spinner(|slot| *slot = Some(create_spinner(message)));
            }
            ExecutionEvent::StepRetrying {
                step_id,
                attempt,
                delay,
            } => {
                let line = format!(
                    "{}{} retrying (attempt {}) in {}",
                    WARN,
                    style(step_id).yellow(),
                    attempt,
                    format_duration_ms(delay.as_millis() as u64)
                );
                self.with_spinner(|slot| match slot {
                    Some(spinner) => spinner.println(&line),
                    None => println!("{}", line),
                });
            }
            ExecutionEvent::StepCompleted { result, .. } => {
                self.with_spinner(|slot| {
                    if let Some(spinner) = slot.take() {
                        spinner.finish_and_clear();
                    }
                });
                println!("{}", format_step_result(result));

                if result.status.is_hard_failure() {
                    if let Some(error) = &result.error {
                        println!("  {}", style(error).red());
                    }
                    let output = format!("{}\n{}", result.stdout.trim_end(), result.stderr.trim_end());
                    let output = output.trim();
                    if !output.is_empty() {
                        for line in format_output_tail(output, 20).lines() {
                            println!("  {}", style(line).dim());
                        }
                    }
                }
            }
            ExecutionEvent::PipelineCompleted { result } => {
                println!("{}", style(separator()).dim());
                println!("{}", format_summary(result));
            }
        }
    }
}

/// Prints each finished run as one JSON document on stdout
pub struct JsonReporter;

#[async_trait]
impl PipelineObserver for JsonReporter {
    async fn on_event(&self, event: &ExecutionEvent) {
        if let ExecutionEvent::PipelineCompleted { result } = event {
            match serde_json::to_string_pretty(result) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!(error = %e, "failed to serialize run result"),
            }
        }
    }
}
