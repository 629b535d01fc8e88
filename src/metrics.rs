//! Metrics collected from executed performance-test scenarios.
//!
//! Each scenario run produces one [`ScenarioMetrics`] record. The session
//! accumulates records as scenarios complete, and reduces them on demand into
//! a [`SessionSummary`].

use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use strum_macros::{Display, EnumString};

use crate::config::GanderConfiguration;
use crate::util;

/// The kind of scenario that produced a [`ScenarioMetrics`] record.
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ScenarioKind {
    /// A ramp-up/steady/ramp-down scenario against a single endpoint.
    Load,
    /// A long-ramp scenario fanning out to multiple endpoints per iteration.
    Stress,
    /// A five-stage baseline/spike/hold/recovery/ramp-down scenario.
    Spike,
    /// A scenario driven by a pre-authored external test plan.
    Plan,
}

/// The measured outcome of one executed scenario.
///
/// Constructed once by an executor immediately after a scenario completes.
/// The only sanctioned change afterwards is the threshold-evaluation outcome,
/// applied through [`ScenarioMetrics::with_outcome`] which returns a new copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Scenario name, unique within a session by convention.
    pub name: String,
    /// What kind of scenario produced this record.
    pub kind: ScenarioKind,
    /// When the scenario started.
    pub started: DateTime<Utc>,
    /// When the scenario ended.
    pub ended: DateTime<Utc>,
    /// Wall-clock scenario duration, in seconds.
    pub duration_seconds: u64,
    /// Total number of requests issued.
    pub total_requests: u64,
    /// Number of requests that succeeded.
    pub successful_requests: u64,
    /// Number of requests that failed.
    pub failed_requests: u64,
    /// Error rate as a percentage (0-100). Some executors report this
    /// independently of the success/failure counts.
    pub error_rate: f64,
    /// Requests per second.
    pub throughput: f64,
    /// Mean response time, in milliseconds.
    pub average_response_time: u64,
    /// Fastest response, in milliseconds.
    pub minimum_response_time: u64,
    /// Slowest response, in milliseconds.
    pub maximum_response_time: u64,
    /// Median response time, in milliseconds.
    pub p50_response_time: u64,
    /// 95th percentile response time, in milliseconds.
    pub p95_response_time: u64,
    /// 99th percentile response time, in milliseconds.
    pub p99_response_time: u64,
    /// Free-form metrics an executor chose to record alongside the core set.
    #[serde(default)]
    pub custom_metrics: BTreeMap<String, serde_json::Value>,
    /// Where the executor persisted the raw results, if anywhere.
    pub results_file: Option<PathBuf>,
    /// Whether the scenario passed threshold evaluation.
    pub passed: bool,
    /// Why the scenario failed, when it did.
    pub failure_reason: Option<String>,
}

impl ScenarioMetrics {
    /// Build a zero-valued record for a scenario that produced no usable
    /// results, carrying a description of what went wrong.
    pub fn empty(
        name: &str,
        kind: ScenarioKind,
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
        failure_reason: &str,
    ) -> ScenarioMetrics {
        ScenarioMetrics {
            name: name.to_string(),
            kind,
            started,
            ended,
            duration_seconds: (ended - started).num_seconds().max(0) as u64,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            error_rate: 100.0,
            throughput: 0.0,
            average_response_time: 0,
            minimum_response_time: 0,
            maximum_response_time: 0,
            p50_response_time: 0,
            p95_response_time: 0,
            p99_response_time: 0,
            custom_metrics: BTreeMap::new(),
            results_file: None,
            passed: false,
            failure_reason: Some(failure_reason.to_string()),
        }
    }

    /// The percentage of requests that succeeded. Returns 0.0 when no
    /// requests were issued.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }

    /// Whether every configured threshold holds for this record.
    pub fn within_thresholds(&self, configuration: &GanderConfiguration) -> bool {
        self.error_rate <= configuration.error_rate_threshold()
            && self.p95_response_time <= configuration.p95_threshold()
            && self.p99_response_time <= configuration.p99_threshold()
            && self.throughput >= configuration.minimum_throughput()
    }

    /// Return a copy of this record with the threshold-evaluation outcome set.
    ///
    /// An empty reason is recorded as `None`.
    pub fn with_outcome(self, passed: bool, failure_reason: String) -> ScenarioMetrics {
        ScenarioMetrics {
            passed,
            failure_reason: if failure_reason.is_empty() {
                None
            } else {
                Some(failure_reason)
            },
            ..self
        }
    }
}

/// Session-wide reduction over all accumulated [`ScenarioMetrics`] records.
///
/// Always recomputed from the full record list, never stored incrementally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// How many scenarios ran during the session.
    pub total_tests: usize,
    /// How many scenarios passed threshold evaluation.
    pub passed_tests: usize,
    /// How many scenarios failed threshold evaluation.
    pub failed_tests: usize,
    /// Arithmetic mean of per-scenario throughput, in requests per second.
    pub average_throughput: f64,
    /// Arithmetic mean of per-scenario p95 response times, in milliseconds.
    pub average_p95_response_time: f64,
    /// Arithmetic mean of per-scenario error rates, as a percentage.
    pub average_error_rate: f64,
    /// The records the summary was reduced from.
    pub results: Vec<ScenarioMetrics>,
}

impl SessionSummary {
    /// Reduce a list of scenario records into a summary.
    ///
    /// Averages are arithmetic means over records, not weighted by request
    /// volume. All rates are 0 for an empty record list.
    pub fn from_results(results: &[ScenarioMetrics]) -> SessionSummary {
        let total_tests = results.len();
        let passed_tests = results.iter().filter(|metrics| metrics.passed).count();
        SessionSummary {
            total_tests,
            passed_tests,
            failed_tests: total_tests - passed_tests,
            average_throughput: mean(results.iter().map(|metrics| metrics.throughput)),
            average_p95_response_time: mean(
                results.iter().map(|metrics| metrics.p95_response_time as f64),
            ),
            average_error_rate: mean(results.iter().map(|metrics| metrics.error_rate)),
            results: results.to_vec(),
        }
    }

    /// The percentage of scenarios that passed. Returns 0.0 when the session
    /// ran no scenarios.
    pub fn pass_rate(&self) -> f64 {
        if self.total_tests == 0 {
            return 0.0;
        }
        self.passed_tests as f64 / self.total_tests as f64 * 100.0
    }
}

/// Arithmetic mean, defaulting to 0 for an empty iterator.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut total = 0.0;
    let mut count: usize = 0;
    for value in values {
        total += value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

impl fmt::Display for SessionSummary {
    // Render the summary as the tables printed at the end of a session.
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            fmt,
            "\n === PER SCENARIO METRICS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>6} | {:>6} | {:>11} | {:>9} | {:>8}",
            "Name", "Type", "Status", "# reqs", "req/s", "p95 (ms)"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for metrics in &self.results {
            writeln!(
                fmt,
                " {:<24} | {:>6} | {:>6} | {:>11} | {:>9.2} | {:>8}",
                util::truncate_string(&metrics.name, 24),
                metrics.kind,
                if metrics.passed { "PASS" } else { "FAIL" },
                util::format_number(metrics.total_requests),
                metrics.throughput,
                metrics.p95_response_time,
            )?;
        }
        writeln!(
            fmt,
            "\n === SESSION SUMMARY ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " scenarios: {} ({} passed, {} failed)",
            self.total_tests, self.passed_tests, self.failed_tests
        )?;
        writeln!(fmt, " pass rate: {:.1}%", self.pass_rate())?;
        writeln!(
            fmt,
            " average throughput: {:.2} req/s",
            self.average_throughput
        )?;
        writeln!(
            fmt,
            " average p95: {:.0} ms",
            self.average_p95_response_time
        )?;
        writeln!(fmt, " average error rate: {:.2}%", self.average_error_rate)?;
        Ok(())
    }
}
