//! Pipeline configuration from YAML

use crate::core::step::{RetryPolicy, StepDefinition};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Keep going after a hard failure (default true)
    #[serde(default)]
    pub continue_on_error: Option<bool>,

    /// Base working directory, relative to the config file
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Base environment for every step
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Default timeout for steps (in milliseconds)
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,

    /// Default retry policy for steps
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Pipeline steps, in execution order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command
    pub command: String,

    /// Working directory, relative to the pipeline working directory
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Environment overrides
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Failures of optional steps are reported as skipped
    #[serde(default)]
    pub optional: bool,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Retry policy for this step (overrides global)
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

/// Watch mode configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Extra exclusion patterns (segment name, path prefix, or glob)
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                anyhow::bail!("Step ID must not be empty");
            }
            if !seen_ids.insert(&step.id) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }
            if step.command.trim().is_empty() {
                anyhow::bail!("Step '{}' has an empty command", step.id);
            }
            if let Some(retry) = &step.retry {
                if retry.max_attempts < 1 {
                    anyhow::bail!(
                        "Step '{}' retry.max_attempts must be at least 1",
                        step.id
                    );
                }
            }
        }

        if let Some(retry) = &self.retry {
            if retry.max_attempts < 1 {
                anyhow::bail!("Pipeline retry.max_attempts must be at least 1");
            }
        }

        Ok(())
    }

    /// Resolve the pipeline's base working directory
    ///
    /// `config_dir` is the directory the config file lives in.
    pub fn base_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        }
    }

    /// Build the immutable step definitions consumed by the engine
    pub fn step_definitions(&self) -> Vec<StepDefinition> {
        let default_retry = self.retry.unwrap_or_default();

        self.steps
            .iter()
            .map(|step| StepDefinition {
                id: step.id.clone(),
                name: step.name.clone().unwrap_or_else(|| step.id.clone()),
                command: step.command.clone(),
                working_dir: step.working_dir.clone(),
                env: step.env.clone(),
                optional: step.optional,
                timeout: step
                    .timeout_ms
                    .or(self.default_timeout_ms)
                    .map(Duration::from_millis),
                retry: step.retry.unwrap_or(default_retry),
            })
            .collect()
    }
}

/// Effective continue-on-error flag. An explicit fail-fast request always wins.
pub fn resolve_continue_on_error(configured: Option<bool>, fail_fast: bool) -> bool {
    if fail_fast {
        return false;
    }
    configured.unwrap_or(true)
}

/// Directory a config file's relative paths resolve against
///
/// A bare file name resolves against the current directory, which is only
/// looked up in that case.
pub fn config_dir(config_path: &Path) -> Result<PathBuf> {
    match config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => Ok(parent.to_path_buf()),
        None => std::env::current_dir().context("Failed to resolve current directory"),
    }
}
