//! # Gander
//!
//! Gander orchestrates performance-test sessions against an HTTP API. It
//! generates k6 scenario scripts, drives the external k6 and JMeter tools as
//! subprocesses, evaluates the measured results against configured
//! thresholds, and renders session reports as HTML, JSON and CSV.
//!
//! Gander does not generate load itself: each scenario blocks on an external
//! tool whose own stage durations bound the run time. What Gander owns is the
//! session: which scenarios ran, what they measured, whether they stayed
//! within thresholds, and the reports that fall out of that history.
//!
//! ## Running a session
//!
//! A [`GanderSession`] is created from a [`GanderConfiguration`], runs any
//! number of scenarios, and reduces them on demand into a
//! [`SessionSummary`](metrics::SessionSummary):
//!
//! ```rust,no_run
//! use gander::config::GanderConfiguration;
//! use gander::report::ReportGenerator;
//! use gander::{GanderError, GanderSession};
//!
//! fn main() -> Result<(), GanderError> {
//!     let configuration = GanderConfiguration::default();
//!     let reports = configuration.report_directory();
//!     let mut session = GanderSession::initialize(configuration)?;
//!
//!     // Run a 10 user load scenario with a 60 second steady state.
//!     let metrics = session.run_load_test("http://localhost:8080", 10, 60)?;
//!     if !metrics.passed {
//!         println!("thresholds violated: {:?}", metrics.failure_reason);
//!     }
//!
//!     // Reduce the session history and render reports.
//!     let summary = session.summary();
//!     let generator = ReportGenerator::new(&reports)?;
//!     generator.write_html_report(&summary, "smoke")?;
//!     generator.write_csv_report(&summary.results, "smoke")?;
//!
//!     Ok(())
//! }
//! ```
//!
//! A scenario that violates thresholds is not an error: the violation is
//! recorded on the returned [`ScenarioMetrics`](metrics::ScenarioMetrics) and
//! the session carries on. Only infrastructure problems (an unwritable
//! reports directory, a missing tool, a k6 process that exits non-zero) fail
//! a `run_*` call, and even then only that one scenario; results collected
//! earlier stay intact.
//!
//! ## Checking results from a test suite
//!
//! The [`thresholds`] module exposes the individual checks directly, for
//! suites that want to assert on a subset of limits or compare a run against
//! a baseline:
//!
//! ```rust,no_run
//! use gander::thresholds::{self, Percentile};
//! # use gander::config::GanderConfiguration;
//! # use gander::{GanderError, GanderSession};
//! # fn main() -> Result<(), GanderError> {
//! # let mut session = GanderSession::initialize(GanderConfiguration::default())?;
//! let baseline = session.run_load_test("http://localhost:8080", 5, 120)?;
//! let stress = session.run_stress_test("http://localhost:8080", 50, 90)?;
//!
//! thresholds::verify_response_time(&baseline, Percentile::P95, 1_000)?;
//! thresholds::verify_success_rate(&stress, 80.0)?;
//! thresholds::verify_no_degradation(&stress, &baseline, 50.0)?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod config;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod thresholds;
pub mod util;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::GanderConfiguration;
use crate::executor::jmeter::JMeterRunner;
use crate::executor::k6::K6Runner;
use crate::executor::ScenarioExecutor;
use crate::metrics::{ScenarioKind, ScenarioMetrics, SessionSummary};

/// An enumeration of all errors a [`GanderSession`] can return.
#[derive(Debug)]
pub enum GanderError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`csv::Error`](https://docs.rs/csv/*/csv/struct.Error.html).
    Csv(csv::Error),
    /// Wraps a [`serde_json::Error`](https://docs.rs/serde_json/*/serde_json/struct.Error.html).
    Serde(serde_json::Error),
    /// Failed to parse a hostname.
    InvalidHost {
        /// The invalid hostname that caused this error.
        host: String,
        /// An optional explanation of the error.
        detail: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error, may be only invalid in context.
        option: String,
        /// The invalid value that caused this error, may be only invalid in context.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// A required external tool is not installed where it was expected.
    ToolNotFound {
        /// The tool that could not be found.
        tool: String,
        /// Where the tool was expected.
        path: String,
    },
    /// An external tool failed to run a scenario.
    Executor {
        /// The scenario that failed.
        scenario: String,
        /// An explanation of the failure.
        detail: String,
    },
    /// Raw results could not be parsed.
    Parse {
        /// The file that could not be parsed.
        path: String,
        /// An explanation of the failure.
        detail: String,
    },
    /// A measured value violated a verified limit.
    ThresholdExceeded {
        /// The check that failed.
        check: String,
        /// The measured value.
        actual: String,
        /// The violated limit.
        limit: String,
    },
}

/// Implement a helper to provide a text description of all possible types of errors.
impl GanderError {
    fn describe(&self) -> &str {
        match *self {
            GanderError::Io(_) => "io::Error",
            GanderError::Csv(_) => "csv::Error",
            GanderError::Serde(_) => "serde_json::Error",
            GanderError::InvalidHost { .. } => "failed to parse hostname",
            GanderError::InvalidOption { .. } => "invalid option or value specified",
            GanderError::ToolNotFound { .. } => "required external tool not found",
            GanderError::Executor { .. } => "external tool failed to run scenario",
            GanderError::Parse { .. } => "failed to parse raw results",
            GanderError::ThresholdExceeded { .. } => "threshold exceeded",
        }
    }
}

/// Implement format trait to allow displaying errors.
impl fmt::Display for GanderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GanderError::Io(ref source) => {
                write!(f, "GanderError: {} ({})", self.describe(), source)
            }
            GanderError::Csv(ref source) => {
                write!(f, "GanderError: {} ({})", self.describe(), source)
            }
            GanderError::Serde(ref source) => {
                write!(f, "GanderError: {} ({})", self.describe(), source)
            }
            GanderError::InvalidHost {
                ref parse_error, ..
            } => write!(f, "GanderError: {} ({})", self.describe(), parse_error),
            GanderError::InvalidOption {
                ref option,
                ref detail,
                ..
            } => write!(f, "GanderError: {} ({}: {})", self.describe(), option, detail),
            GanderError::ToolNotFound { ref tool, ref path } => {
                write!(f, "GanderError: {} ({} at {})", self.describe(), tool, path)
            }
            GanderError::Executor {
                ref scenario,
                ref detail,
            } => write!(
                f,
                "GanderError: {} ({}: {})",
                self.describe(),
                scenario,
                detail
            ),
            GanderError::Parse {
                ref path,
                ref detail,
            } => write!(f, "GanderError: {} ({}: {})", self.describe(), path, detail),
            GanderError::ThresholdExceeded {
                ref check,
                ref actual,
                ref limit,
            } => write!(
                f,
                "GanderError: {} ({} {}, expected {})",
                self.describe(),
                check,
                actual,
                limit
            ),
        }
    }
}

// Define the lower level source of this error, if any.
impl std::error::Error for GanderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            GanderError::Io(ref source) => Some(source),
            GanderError::Csv(ref source) => Some(source),
            GanderError::Serde(ref source) => Some(source),
            GanderError::InvalidHost {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for GanderError {
    fn from(err: io::Error) -> GanderError {
        GanderError::Io(err)
    }
}

/// Auto-convert CSV errors.
impl From<csv::Error> for GanderError {
    fn from(err: csv::Error) -> GanderError {
        GanderError::Csv(err)
    }
}

/// Auto-convert serde_json errors.
impl From<serde_json::Error> for GanderError {
    fn from(err: serde_json::Error) -> GanderError {
        GanderError::Serde(err)
    }
}

/// Template for the load scenario: ramp up, hold a steady state against one
/// endpoint, ramp down.
const LOAD_SCRIPT_TEMPLATE: &str = r#"import http from 'k6/http';
import { check, sleep } from 'k6';
import { Rate } from 'k6/metrics';

export let errorRate = new Rate('errors');

export let options = {
    stages: [
        { duration: '30s', target: {{USERS}} },     // Ramp up
        { duration: '{{DURATION}}s', target: {{USERS}} },     // Stay at load
        { duration: '30s', target: 0 },      // Ramp down
    ],
    thresholds: {
        http_req_duration: ['p(95)<2000'],
        errors: ['rate<0.01'],
    },
    summaryTrendStats: ['avg', 'min', 'med', 'max', 'p(95)', 'p(99)'],
};

export default function() {
    let response = http.get('{{BASE_URL}}/posts');
    check(response, {
        'status is 200': (r) => r.status === 200,
        'response time < 2000ms': (r) => r.timings.duration < 2000,
    });
    errorRate.add(response.status !== 200);
    sleep(1);
}
"#;

/// Template for the stress scenario: a longer ramp to the stress level, with
/// each iteration fanning out to three endpoints to simulate mixed traffic.
const STRESS_SCRIPT_TEMPLATE: &str = r#"import http from 'k6/http';
import { check, sleep } from 'k6';
import { Rate } from 'k6/metrics';

export let errorRate = new Rate('errors');

export let options = {
    stages: [
        { duration: '60s', target: {{USERS}} },     // Ramp up to stress level
        { duration: '{{DURATION}}s', target: {{USERS}} },     // Stay at stress level
        { duration: '60s', target: 0 },      // Ramp down
    ],
    thresholds: {
        http_req_duration: ['p(99)<5000'],
        errors: ['rate<0.05'],
    },
    summaryTrendStats: ['avg', 'min', 'med', 'max', 'p(95)', 'p(99)'],
};

export default function() {
    let responses = http.batch([
        ['GET', '{{BASE_URL}}/posts'],
        ['GET', '{{BASE_URL}}/users'],
        ['GET', '{{BASE_URL}}/comments'],
    ]);

    for (let response of responses) {
        check(response, {
            'status is 200': (r) => r.status === 200,
        });
        errorRate.add(response.status !== 200);
    }

    sleep(Math.random() * 2);
}
"#;

/// Template for the spike scenario: baseline, spike, hold, recovery, ramp
/// down. Each request targets a randomized resource id to avoid cache skew.
const SPIKE_SCRIPT_TEMPLATE: &str = r#"import http from 'k6/http';
import { check, sleep } from 'k6';
import { Rate } from 'k6/metrics';

export let errorRate = new Rate('errors');

export let options = {
    stages: [
        { duration: '10s', target: 10 },     // Normal load
        { duration: '10s', target: {{USERS}} },     // Spike!
        { duration: '{{DURATION}}s', target: {{USERS}} },     // Stay at spike
        { duration: '10s', target: 10 },     // Back to normal
        { duration: '10s', target: 0 },      // Ramp down
    ],
    thresholds: {
        http_req_duration: ['p(95)<3000'],
        errors: ['rate<0.1'],
    },
    summaryTrendStats: ['avg', 'min', 'med', 'max', 'p(95)', 'p(99)'],
};

export default function() {
    let response = http.get('{{BASE_URL}}/posts/' + Math.floor(Math.random() * 100 + 1));
    check(response, {
        'status is 200': (r) => r.status === 200,
        'response time < 3000ms': (r) => r.timings.duration < 3000,
    });
    errorRate.add(response.status !== 200);
    sleep(0.5);
}
"#;

/// Render a scenario script template against its parameters.
fn scenario_script(template: &str, base_url: &str, users: usize, duration_seconds: usize) -> String {
    let mut variables = BTreeMap::new();
    variables.insert("BASE_URL".to_string(), base_url.to_string());
    variables.insert("USERS".to_string(), users.to_string());
    variables.insert("DURATION".to_string(), duration_seconds.to_string());
    util::render_template(template, &variables)
}

/// A performance-test session: runs scenarios, owns the history of their
/// measured results, and reduces that history into a summary.
///
/// Scenario execution is synchronous and single-threaded; each `run_*` call
/// blocks until the external tool completes. A record is appended to the
/// session history only when its scenario actually produced one, so a failed
/// invocation never leaves a partial record behind.
pub struct GanderSession {
    /// The configuration this session was created with.
    configuration: GanderConfiguration,
    /// Runs generated k6 scenario scripts.
    script_executor: Box<dyn ScenarioExecutor>,
    /// Runs pre-authored JMeter test plans.
    plan_executor: Box<dyn ScenarioExecutor>,
    /// Every record measured during this session, in execution order.
    results: Vec<ScenarioMetrics>,
}

impl GanderSession {
    /// Create a session using the k6 and JMeter executors, creating the
    /// reports directory if needed.
    pub fn initialize(configuration: GanderConfiguration) -> Result<GanderSession, GanderError> {
        fs::create_dir_all(configuration.report_directory())?;
        info!(
            "session initialized, reports directory: {}",
            configuration.report_directory().display()
        );
        Ok(GanderSession {
            script_executor: Box::new(K6Runner::new(&configuration)),
            plan_executor: Box::new(JMeterRunner::new(&configuration)),
            configuration,
            results: Vec::new(),
        })
    }

    /// Replace the executor used for generated scenario scripts.
    pub fn set_script_executor(mut self, executor: Box<dyn ScenarioExecutor>) -> Self {
        self.script_executor = executor;
        self
    }

    /// Replace the executor used for pre-authored test plans.
    pub fn set_plan_executor(mut self, executor: Box<dyn ScenarioExecutor>) -> Self {
        self.plan_executor = executor;
        self
    }

    /// Run a load scenario: ramp up to `users`, hold for `duration_seconds`,
    /// ramp down. The returned record carries the threshold outcome; a
    /// threshold violation is recorded, not raised.
    pub fn run_load_test(
        &mut self,
        base_url: &str,
        users: usize,
        duration_seconds: usize,
    ) -> Result<ScenarioMetrics, GanderError> {
        info!(
            "starting load test - users: {}, duration: {}s, url: {}",
            users, duration_seconds, base_url
        );
        let script = self.write_scenario_script(
            &scenario_script(LOAD_SCRIPT_TEMPLATE, base_url, users, duration_seconds),
            "load_test_script.js",
        )?;
        let scenario_name = format!(
            "load_test_{}u_{}s_{}",
            users,
            duration_seconds,
            util::file_timestamp()
        );

        let metrics = self
            .script_executor
            .execute(&script, &scenario_name, &BTreeMap::new())?;
        let metrics = self.record(metrics, ScenarioKind::Load);

        info!("load test throughput: {:.2} req/s", metrics.throughput);
        info!("load test p95: {} ms", metrics.p95_response_time);
        info!("load test error rate: {:.2}%", metrics.error_rate);
        Ok(metrics)
    }

    /// Run a stress scenario: a longer ramp up to `max_users` with mixed
    /// traffic across three endpoints.
    pub fn run_stress_test(
        &mut self,
        base_url: &str,
        max_users: usize,
        duration_seconds: usize,
    ) -> Result<ScenarioMetrics, GanderError> {
        info!(
            "starting stress test - max users: {}, duration: {}s, url: {}",
            max_users, duration_seconds, base_url
        );
        let script = self.write_scenario_script(
            &scenario_script(STRESS_SCRIPT_TEMPLATE, base_url, max_users, duration_seconds),
            "stress_test_script.js",
        )?;
        let scenario_name = format!(
            "stress_test_{}u_{}s_{}",
            max_users,
            duration_seconds,
            util::file_timestamp()
        );

        let metrics = self
            .script_executor
            .execute(&script, &scenario_name, &BTreeMap::new())?;
        let metrics = self.record(metrics, ScenarioKind::Stress);

        info!("stress test peak throughput: {:.2} req/s", metrics.throughput);
        info!("stress test p99: {} ms", metrics.p99_response_time);
        Ok(metrics)
    }

    /// Run a spike scenario: baseline, spike to `spike_users`, hold for
    /// `spike_duration_seconds`, recover, ramp down.
    pub fn run_spike_test(
        &mut self,
        base_url: &str,
        spike_users: usize,
        spike_duration_seconds: usize,
    ) -> Result<ScenarioMetrics, GanderError> {
        info!(
            "starting spike test - spike users: {}, duration: {}s, url: {}",
            spike_users, spike_duration_seconds, base_url
        );
        let script = self.write_scenario_script(
            &scenario_script(
                SPIKE_SCRIPT_TEMPLATE,
                base_url,
                spike_users,
                spike_duration_seconds,
            ),
            "spike_test_script.js",
        )?;
        let scenario_name = format!(
            "spike_test_{}u_{}s_{}",
            spike_users,
            spike_duration_seconds,
            util::file_timestamp()
        );

        let metrics = self
            .script_executor
            .execute(&script, &scenario_name, &BTreeMap::new())?;
        let metrics = self.record(metrics, ScenarioKind::Spike);

        info!(
            "spike test recovery time: {} ms",
            metrics.average_response_time
        );
        Ok(metrics)
    }

    /// Run a pre-authored test plan through the plan executor, applying
    /// `properties` as key-value overrides. The result joins the session
    /// history and threshold evaluation like any other scenario.
    pub fn run_plan_test(
        &mut self,
        plan: &Path,
        test_name: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<ScenarioMetrics, GanderError> {
        info!(
            "starting plan test {} with plan: {}",
            test_name,
            plan.display()
        );
        let scenario_name = format!("{}_{}", test_name, util::file_timestamp());
        let metrics = self
            .plan_executor
            .execute(plan, &scenario_name, properties)?;
        Ok(self.record(metrics, ScenarioKind::Plan))
    }

    /// A copy of every record measured during this session, in execution
    /// order. Mutating the returned list does not affect the session.
    pub fn results(&self) -> Vec<ScenarioMetrics> {
        self.results.clone()
    }

    /// Reduce the session history into a summary. Defined for an empty
    /// history: all counts and rates are zero.
    pub fn summary(&self) -> SessionSummary {
        debug!("summarizing {} scenario records", self.results.len());
        SessionSummary::from_results(&self.results)
    }

    /// The configuration this session was created with.
    pub fn configuration(&self) -> &GanderConfiguration {
        &self.configuration
    }

    /// Tag a freshly-measured record, apply threshold evaluation, and append
    /// it to the session history.
    fn record(&mut self, metrics: ScenarioMetrics, kind: ScenarioKind) -> ScenarioMetrics {
        let metrics = ScenarioMetrics { kind, ..metrics };
        // A record the executor already marked as unusable keeps its failure
        // reason; everything else gets the threshold verdict.
        let metrics = if metrics.failure_reason.is_some() {
            error!(
                "scenario {} produced no usable results: {}",
                metrics.name,
                metrics.failure_reason.as_deref().unwrap_or("")
            );
            metrics
        } else {
            let (passed, failure_reason) = thresholds::evaluate(&metrics, &self.configuration);
            if passed {
                info!("scenario {} passed all thresholds", metrics.name);
            } else {
                error!("scenario {} failed: {}", metrics.name, failure_reason);
            }
            metrics.with_outcome(passed, failure_reason)
        };
        self.results.push(metrics.clone());
        metrics
    }

    /// Write a generated scenario script under the reports directory.
    fn write_scenario_script(
        &self,
        content: &str,
        file_name: &str,
    ) -> Result<PathBuf, GanderError> {
        let script_directory = self.configuration.report_directory().join("scripts");
        fs::create_dir_all(&script_directory)?;
        let script = script_directory.join(file_name);
        fs::write(&script, content)?;
        debug!("generated k6 script: {}", script.display());
        Ok(script)
    }
}
