//! Metric extraction from captured step output
//!
//! Parsers are tried in registration order. The first parser that both
//! matches the step and yields a metric wins; a matching parser that finds
//! nothing falls through to the next one.

use crate::core::{Metric, MetricValue, StepDefinition};
use regex::Regex;
use std::sync::OnceLock;

/// One known output format
pub trait MetricParser: Send + Sync {
    /// Whether this parser applies to the step at all
    fn matches(&self, step: &StepDefinition) -> bool;

    /// Extract a metric from combined stdout/stderr
    fn parse(&self, output: &str) -> Option<Metric>;
}

/// Ordered collection of parsers
pub struct MetricResolver {
    parsers: Vec<Box<dyn MetricParser>>,
}

impl Default for MetricResolver {
    /// Test runners first, then workspace task runners, then explicit metric lines
    fn default() -> Self {
        Self::empty()
            .with_parser(TestRunnerParser)
            .with_parser(WorkspaceTaskParser)
            .with_parser(GenericMetricParser)
    }
}

impl MetricResolver {
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Register a parser after the existing ones
    pub fn with_parser<P: MetricParser + 'static>(mut self, parser: P) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    pub fn resolve(&self, step: &StepDefinition, output: &str) -> Option<Metric> {
        self.parsers
            .iter()
            .filter(|parser| parser.matches(step))
            .find_map(|parser| parser.parse(output))
    }
}

fn lazy_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// cargo test, jest/vitest and pytest summaries
pub struct TestRunnerParser;

const TEST_COMMAND_HINTS: &[&str] = &["test", "jest", "vitest", "pytest", "mocha", "nextest"];

impl MetricParser for TestRunnerParser {
    fn matches(&self, step: &StepDefinition) -> bool {
        let command = step.command.to_lowercase();
        TEST_COMMAND_HINTS.iter().any(|hint| command.contains(hint))
    }

    fn parse(&self, output: &str) -> Option<Metric> {
        static CARGO: OnceLock<Option<Regex>> = OnceLock::new();
        static JEST: OnceLock<Option<Regex>> = OnceLock::new();
        static PYTEST: OnceLock<Option<Regex>> = OnceLock::new();

        // cargo prints one summary per test binary; add them up
        let cargo = lazy_regex(&CARGO, r"test result: \w+\. (\d+) passed; (\d+) failed")?;
        let mut found = false;
        let (mut passed, mut failed) = (0u64, 0u64);
        for caps in cargo.captures_iter(output) {
            found = true;
            passed += caps[1].parse::<u64>().unwrap_or(0);
            failed += caps[2].parse::<u64>().unwrap_or(0);
        }
        if found {
            return Some(tests_metric(passed, failed));
        }

        let jest = lazy_regex(&JEST, r"Tests:\s+(?:(\d+) failed, )?(?:\d+ skipped, )?(\d+) passed")?;
        if let Some(caps) = jest.captures_iter(output).last() {
            let failed = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let passed = caps[2].parse().unwrap_or(0);
            return Some(tests_metric(passed, failed));
        }

        let pytest = lazy_regex(&PYTEST, r"=+ (?:(\d+) failed, )?(\d+) passed")?;
        if let Some(caps) = pytest.captures_iter(output).last() {
            let failed = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let passed = caps[2].parse().unwrap_or(0);
            return Some(tests_metric(passed, failed));
        }

        None
    }
}

fn tests_metric(passed: u64, failed: u64) -> Metric {
    if failed == 0 {
        Metric::new("tests", MetricValue::Number(passed as f64))
    } else {
        Metric::new("tests", MetricValue::Text(format!("{} passed, {} failed", passed, failed)))
    }
}

/// turbo and nx task summaries
pub struct WorkspaceTaskParser;

impl MetricParser for WorkspaceTaskParser {
    fn matches(&self, step: &StepDefinition) -> bool {
        let command = step.command.to_lowercase();
        command.contains("turbo") || command.contains("nx ") || command.contains("run-many")
    }

    fn parse(&self, output: &str) -> Option<Metric> {
        static TURBO: OnceLock<Option<Regex>> = OnceLock::new();
        static NX: OnceLock<Option<Regex>> = OnceLock::new();

        let turbo = lazy_regex(&TURBO, r"Tasks:\s+(\d+) successful, (\d+) total")?;
        if let Some(caps) = turbo.captures_iter(output).last() {
            return Some(Metric::new(
                "tasks",
                MetricValue::Text(format!("{}/{}", &caps[1], &caps[2])),
            ));
        }

        let nx = lazy_regex(&NX, r"Successfully ran target \S+ for (\d+) projects?")?;
        if let Some(caps) = nx.captures_iter(output).last() {
            return Some(Metric::new("tasks", MetricValue::parse(&caps[1])));
        }

        None
    }
}

/// Explicit `metric: <label>=<value>` lines; the last one wins
pub struct GenericMetricParser;

impl MetricParser for GenericMetricParser {
    fn matches(&self, _step: &StepDefinition) -> bool {
        true
    }

    fn parse(&self, output: &str) -> Option<Metric> {
        static LINE: OnceLock<Option<Regex>> = OnceLock::new();

        let line = lazy_regex(&LINE, r"(?mi)^\s*metric:\s*([\w.\-]+)\s*=\s*(.+?)\s*$")?;
        line.captures_iter(output)
            .last()
            .map(|caps| Metric::new(&caps[1], MetricValue::parse(&caps[2])))
    }
}
