//! Step domain model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A single step in a pipeline
///
/// Built once per run by the configuration layer and never mutated by the engine.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    /// Unique step identifier
    pub id: String,

    /// Display label
    pub name: String,

    /// Shell command to run
    pub command: String,

    /// Working directory override (relative paths resolve against the pipeline base dir)
    pub working_dir: Option<PathBuf>,

    /// Environment overrides applied on top of the base environment
    pub env: HashMap<String, String>,

    /// Optional steps never count as hard failures
    pub optional: bool,

    /// Hard timeout per attempt
    pub timeout: Option<Duration>,

    /// Retry policy
    pub retry: RetryPolicy,
}

impl StepDefinition {
    /// Create a step with default policies; `name` defaults to `id`
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            command: command.into(),
            working_dir: None,
            env: HashMap::new(),
            optional: false,
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Merge a base environment with this step's overrides. Step values win.
    pub fn effective_env(&self, base: &HashMap<String, String>) -> HashMap<String, String> {
        merge_env(base, &self.env)
    }

    /// Resolve the working directory for this step against a base directory
    pub fn effective_working_dir(&self, base: &std::path::Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        }
    }
}

/// Produce a fresh environment map; neither input is modified.
pub fn merge_env(
    base: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// How a step is retried after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,

    /// Pause between attempts
    #[serde(with = "duration_ms", rename = "delay_ms")]
    pub delay: Duration,

    /// Whether a timed-out attempt may be retried
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            retry_on_timeout: false,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Whether another attempt is allowed after `attempts` have run
    pub fn allows_retry(&self, attempts: u32, timed_out: bool) -> bool {
        self.max_attempts > 1
            && attempts < self.max_attempts
            && (!timed_out || self.retry_on_timeout)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
