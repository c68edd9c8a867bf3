//! Pipeline execution engine

pub mod controller;
pub mod engine;
pub mod executor;
pub mod metrics;

pub use controller::{classify_failure, StepContext, StepController};
pub use engine::{ExecutionEngine, ExecutionEvent, PipelineObserver, RunOptions};
pub use executor::{CommandExecutor, CommandRequest, ExecutionOutcome, ShellExecutor};
pub use metrics::{
    GenericMetricParser, MetricParser, MetricResolver, TestRunnerParser, WorkspaceTaskParser,
};
