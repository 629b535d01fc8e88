//! Session-level tests, driving the orchestration pipeline end to end with
//! stub executors standing in for the external tools.

use chrono::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gander::config::GanderConfiguration;
use gander::executor::ScenarioExecutor;
use gander::metrics::{ScenarioKind, ScenarioMetrics};
use gander::report::ReportGenerator;
use gander::{GanderError, GanderSession};

/// An executor that measures nothing and reports canned numbers.
#[derive(Clone)]
struct StubExecutor {
    error_rate: f64,
    p95_response_time: u64,
    throughput: f64,
    executed: Arc<Mutex<Vec<PathBuf>>>,
}

impl StubExecutor {
    /// A stub reporting the given error rate, p95 and throughput, with the
    /// remaining measurements fixed at sensible values.
    fn reporting(error_rate: f64, p95_response_time: u64, throughput: f64) -> StubExecutor {
        StubExecutor {
            error_rate,
            p95_response_time,
            throughput,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn executed_sources(&self) -> Vec<PathBuf> {
        self.executed.lock().unwrap().clone()
    }
}

impl ScenarioExecutor for StubExecutor {
    fn execute(
        &self,
        source: &Path,
        scenario_name: &str,
        _properties: &BTreeMap<String, String>,
    ) -> Result<ScenarioMetrics, GanderError> {
        self.executed.lock().unwrap().push(source.to_path_buf());
        let started = Utc::now();
        Ok(ScenarioMetrics {
            name: scenario_name.to_string(),
            kind: ScenarioKind::Load,
            started,
            ended: started + chrono::Duration::seconds(60),
            duration_seconds: 60,
            total_requests: 1_000,
            successful_requests: 995,
            failed_requests: 5,
            error_rate: self.error_rate,
            throughput: self.throughput,
            average_response_time: 500,
            minimum_response_time: 100,
            maximum_response_time: 2_000,
            p50_response_time: 450,
            p95_response_time: self.p95_response_time,
            p99_response_time: 1_800,
            custom_metrics: BTreeMap::new(),
            results_file: None,
            passed: false,
            failure_reason: None,
        })
    }
}

/// An executor whose external tool cannot be run at all.
struct FailingExecutor;

impl ScenarioExecutor for FailingExecutor {
    fn execute(
        &self,
        _source: &Path,
        scenario_name: &str,
        _properties: &BTreeMap<String, String>,
    ) -> Result<ScenarioMetrics, GanderError> {
        Err(GanderError::Executor {
            scenario: scenario_name.to_string(),
            detail: "tool exited with exit status: 99".to_string(),
        })
    }
}

/// An executor whose tool ran but produced no usable results.
struct DegradedExecutor;

impl ScenarioExecutor for DegradedExecutor {
    fn execute(
        &self,
        _source: &Path,
        scenario_name: &str,
        _properties: &BTreeMap<String, String>,
    ) -> Result<ScenarioMetrics, GanderError> {
        let started = Utc::now();
        Ok(ScenarioMetrics::empty(
            scenario_name,
            ScenarioKind::Plan,
            started,
            started,
            "No results generated",
        ))
    }
}

/// A configuration writing into a unique temporary reports directory.
fn test_configuration(test_name: &str) -> GanderConfiguration {
    let mut configuration = GanderConfiguration::default();
    configuration.report_directory = std::env::temp_dir()
        .join(format!("gander_{}_{}", std::process::id(), test_name))
        .display()
        .to_string();
    configuration
}

fn cleanup(configuration: &GanderConfiguration) {
    let _ = fs::remove_dir_all(configuration.report_directory());
}

#[test]
fn load_test_within_thresholds_passes() {
    let configuration = test_configuration("load_pass");
    // The executor reports 1,000 requests, 0.5% errors, p95 of 1,200ms and
    // 16.6 req/s; the default thresholds are p95<=2000, p99<=5000,
    // error rate<=1.0 and throughput>=10.
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(StubExecutor::reporting(0.5, 1_200, 16.6)));

    let metrics = session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap();

    assert!(metrics.passed);
    assert_eq!(metrics.failure_reason, None);
    assert_eq!(metrics.kind, ScenarioKind::Load);
    assert!(metrics.name.starts_with("load_test_10u_60s_"));

    // The record joined the session history.
    let results = session.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0], metrics);

    cleanup(&configuration);
}

#[test]
fn threshold_violation_is_recorded_not_raised() {
    let configuration = test_configuration("load_fail");
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(StubExecutor::reporting(2.0, 1_200, 16.6)));

    let metrics = session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap();

    assert!(!metrics.passed);
    let reason = metrics.failure_reason.unwrap();
    assert!(reason.contains("Error rate 2.00% exceeds threshold 1.00%"));
    // The failed record still joined the history.
    assert_eq!(session.results().len(), 1);

    cleanup(&configuration);
}

#[test]
fn scenario_kinds_follow_the_operation() {
    let configuration = test_configuration("kinds");
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(StubExecutor::reporting(0.5, 1_200, 16.6)));

    session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap();
    session
        .run_stress_test("http://localhost:8080", 50, 120)
        .unwrap();
    session
        .run_spike_test("http://localhost:8080", 100, 30)
        .unwrap();

    let kinds: Vec<ScenarioKind> = session
        .results()
        .iter()
        .map(|metrics| metrics.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![ScenarioKind::Load, ScenarioKind::Stress, ScenarioKind::Spike]
    );

    cleanup(&configuration);
}

#[test]
fn scenario_scripts_are_generated() {
    let configuration = test_configuration("scripts");
    let stub = StubExecutor::reporting(0.5, 1_200, 16.6);
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(stub.clone()));

    session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap();
    session
        .run_stress_test("http://localhost:8080", 50, 120)
        .unwrap();
    session
        .run_spike_test("http://localhost:8080", 100, 30)
        .unwrap();

    let script_directory = configuration.report_directory().join("scripts");
    for file_name in [
        "load_test_script.js",
        "stress_test_script.js",
        "spike_test_script.js",
    ] {
        let script = script_directory.join(file_name);
        assert!(script.exists(), "missing {}", script.display());
        let content = fs::read_to_string(&script).unwrap();
        assert!(content.contains("http://localhost:8080"));
    }

    // The generated scripts are what the executor was handed.
    let executed = stub.executed_sources();
    assert_eq!(executed.len(), 3);
    assert!(executed[0].ends_with("load_test_script.js"));

    cleanup(&configuration);
}

#[test]
fn failed_invocation_leaves_no_partial_record() {
    let configuration = test_configuration("executor_failure");
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(FailingExecutor));

    let error = session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap_err();
    assert!(matches!(error, GanderError::Executor { .. }));

    // History is untouched and the summary still works.
    assert!(session.results().is_empty());
    assert_eq!(session.summary().total_tests, 0);
    assert_eq!(session.summary().pass_rate(), 0.0);

    cleanup(&configuration);
}

#[test]
fn degraded_plan_run_joins_the_history() {
    let configuration = test_configuration("degraded_plan");
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_plan_executor(Box::new(DegradedExecutor));

    let metrics = session
        .run_plan_test(
            Path::new("plans/api_plan.jmx"),
            "api_plan",
            &BTreeMap::new(),
        )
        .unwrap();

    // The degraded record keeps its executor-supplied reason instead of a
    // threshold verdict.
    assert!(!metrics.passed);
    assert_eq!(
        metrics.failure_reason.as_deref(),
        Some("No results generated")
    );
    assert_eq!(metrics.kind, ScenarioKind::Plan);
    assert_eq!(metrics.total_requests, 0);
    assert_eq!(metrics.success_rate(), 0.0);
    assert_eq!(session.results().len(), 1);

    cleanup(&configuration);
}

#[test]
fn results_copy_cannot_mutate_the_history() {
    let configuration = test_configuration("results_copy");
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(StubExecutor::reporting(0.5, 1_200, 16.6)));

    session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap();

    let mut copied = session.results();
    copied.clear();
    assert_eq!(session.results().len(), 1);

    cleanup(&configuration);
}

#[test]
fn summary_reduces_mixed_outcomes() {
    let configuration = test_configuration("summary");
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(StubExecutor::reporting(0.5, 1_200, 16.6)));

    session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap();
    // The second scenario violates the error rate threshold.
    session = session.set_script_executor(Box::new(StubExecutor::reporting(4.0, 1_200, 16.6)));
    session
        .run_stress_test("http://localhost:8080", 50, 120)
        .unwrap();
    session = session.set_script_executor(Box::new(StubExecutor::reporting(0.5, 1_200, 16.6)));
    session
        .run_spike_test("http://localhost:8080", 100, 30)
        .unwrap();

    let summary = session.summary();
    assert_eq!(summary.total_tests, 3);
    assert_eq!(summary.passed_tests, 2);
    assert_eq!(summary.failed_tests, 1);
    assert!((summary.pass_rate() - 66.67).abs() < 0.01);
    assert!((summary.average_throughput - 16.6).abs() < 0.001);

    cleanup(&configuration);
}

#[test]
fn session_reports_are_rendered_from_the_history() {
    let configuration = test_configuration("session_reports");
    let mut session = GanderSession::initialize(configuration.clone())
        .unwrap()
        .set_script_executor(Box::new(StubExecutor::reporting(2.0, 1_200, 16.6)));

    session
        .run_load_test("http://localhost:8080", 10, 60)
        .unwrap();
    let summary = session.summary();

    let generator = ReportGenerator::new(&configuration.report_directory()).unwrap();
    let html = generator.write_html_report(&summary, "session").unwrap();
    let json = generator
        .write_json_report(&summary.results, "session")
        .unwrap();
    let csv = generator
        .write_csv_report(&summary.results, "session")
        .unwrap();

    let html_content = fs::read_to_string(&html).unwrap();
    // The threshold verdict flows all the way into the failed section.
    assert!(html_content.contains("Failed Scenarios"));
    assert!(html_content.contains("Error rate 2.00% exceeds threshold 1.00%"));

    let parsed: Vec<ScenarioMetrics> =
        serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(parsed, session.results());

    let csv_content = fs::read_to_string(&csv).unwrap();
    assert_eq!(csv_content.lines().count(), 2);

    cleanup(&configuration);
}
