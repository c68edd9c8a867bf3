//! CLI command definitions

use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Stop at the first failed or timed-out step
    #[arg(long)]
    pub fail_fast: bool,

    /// Print the run result as JSON instead of progress output
    #[arg(long)]
    pub json: bool,

    /// Rerun the pipeline whenever project files change
    #[arg(short, long)]
    pub watch: bool,

    /// Extra paths to ignore in watch mode (segment name, path prefix, or glob)
    #[arg(long)]
    pub exclude: Vec<String>,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
