//! Path filtering for watch mode

use crate::watch::WatchError;
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};

/// Directory names that never trigger a rerun
pub const BUILTIN_IGNORES: &[&str] = &[
    // build output and dependencies
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "coverage",
    ".next",
    ".turbo",
    ".cache",
    "__pycache__",
    ".pytest_cache",
    ".venv",
    // version control
    ".git",
    ".hg",
    ".svn",
    // editors
    ".idea",
    ".vscode",
    ".history",
];

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One user-supplied exclusion
#[derive(Debug, Clone)]
pub enum ExcludePattern {
    /// Matches any path segment with this exact name
    Segment(String),
    /// Matches this relative path and everything below it
    Prefix(String),
    /// `*` stays within a segment, `**` crosses segments
    Glob(Pattern),
}

impl ExcludePattern {
    pub fn parse(raw: &str) -> Result<Self, WatchError> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
        let trimmed = trimmed.trim_end_matches('/');

        if trimmed.contains(['*', '?', '[']) {
            let pattern = Pattern::new(trimmed).map_err(|source| WatchError::InvalidPattern {
                pattern: raw.to_string(),
                source,
            })?;
            Ok(ExcludePattern::Glob(pattern))
        } else if trimmed.contains('/') {
            Ok(ExcludePattern::Prefix(trimmed.to_string()))
        } else {
            Ok(ExcludePattern::Segment(trimmed.to_string()))
        }
    }

    fn matches(&self, relative: &str, segments: &[&str]) -> bool {
        match self {
            ExcludePattern::Segment(name) => segments.iter().any(|s| s == name),
            ExcludePattern::Prefix(prefix) => {
                relative == prefix
                    || relative
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            ExcludePattern::Glob(pattern) => {
                pattern.matches_with(relative, GLOB_OPTIONS)
                    || segments.iter().any(|s| pattern.matches_with(s, GLOB_OPTIONS))
            }
        }
    }
}

/// Decides which changed paths are relevant
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    excludes: Vec<ExcludePattern>,
}

impl PathFilter {
    pub fn new(root: impl Into<PathBuf>, patterns: &[String]) -> Result<Self, WatchError> {
        let excludes = patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| ExcludePattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.into(),
            excludes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when the path should never trigger a rerun
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        let segments: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        if segments.iter().any(|s| BUILTIN_IGNORES.contains(s)) {
            return true;
        }

        let joined = segments.join("/");
        self.excludes.iter().any(|e| e.matches(&joined, &segments))
    }
}
