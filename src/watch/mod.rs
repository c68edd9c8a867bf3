//! Watch mode - rerun the pipeline when project files change

pub mod filter;
pub mod scheduler;

pub use filter::{ExcludePattern, PathFilter, BUILTIN_IGNORES};
pub use scheduler::{
    PipelineJob, RunTrigger, WatchEvent, WatchOutcome, WatchScheduler, WatchState, DEBOUNCE_DELAY,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("File watching is unavailable: {0}")]
    Unavailable(#[from] notify::Error),

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}
