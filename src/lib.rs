//! taskline - a local task pipeline runner with retries, timeouts and watch mode

pub mod cli;
pub mod core;
pub mod execution;
pub mod watch;

// Re-export commonly used types
pub use crate::core::config::PipelineConfig;
pub use crate::core::{PipelineRunResult, RetryPolicy, StepDefinition, StepResult, StepStatus};
pub use crate::execution::{CommandExecutor, ExecutionEngine, ExecutionEvent, RunOptions, ShellExecutor};
pub use crate::watch::{WatchOutcome, WatchScheduler};
