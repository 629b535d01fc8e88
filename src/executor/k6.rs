//! The script-driven k6 executor.
//!
//! Invokes the k6 command-line tool on a generated scenario script, streaming
//! raw samples to a JSON results file and the end-of-test aggregates to a
//! summary file, then parses the summary into a [`ScenarioMetrics`] record.

use chrono::prelude::*;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::GanderConfiguration;
use crate::executor::ScenarioExecutor;
use crate::metrics::{ScenarioKind, ScenarioMetrics};
use crate::GanderError;

/// Runs scenario scripts with the k6 command-line tool.
///
/// A k6 process that cannot be started or exits non-zero fails the scenario
/// outright. An unreadable summary degrades to a zero-valued failed record.
pub struct K6Runner {
    binary: String,
    report_directory: PathBuf,
}

/// The end-of-test summary k6 writes with `--summary-export`.
#[derive(Debug, Deserialize)]
struct K6Summary {
    #[serde(default)]
    metrics: HashMap<String, K6Metric>,
}

/// One named metric in the summary. Aggregate names vary by metric type
/// (count/rate for counters, value for rates, avg/min/med/max and
/// percentiles for trends), so they're kept as a loose map.
#[derive(Debug, Default, Deserialize)]
struct K6Metric {
    #[serde(flatten)]
    values: HashMap<String, serde_json::Value>,
}

impl K6Metric {
    fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(|value| value.as_f64())
    }
}

impl K6Runner {
    /// Create a runner invoking the configured k6 binary.
    pub fn new(configuration: &GanderConfiguration) -> K6Runner {
        K6Runner {
            binary: configuration.k6_binary(),
            report_directory: configuration.report_directory(),
        }
    }

    /// Parse a `--summary-export` file into a metrics record.
    fn parse_summary(
        summary_file: &Path,
        scenario_name: &str,
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
        results_file: &Path,
    ) -> Result<ScenarioMetrics, GanderError> {
        let raw = fs::read_to_string(summary_file)?;
        let summary: K6Summary = serde_json::from_str(&raw)?;

        let requests = summary.metrics.get("http_reqs").ok_or_else(|| {
            GanderError::Parse {
                path: summary_file.display().to_string(),
                detail: "summary has no http_reqs metric".to_string(),
            }
        })?;
        let total_requests = requests.value("count").unwrap_or(0.0).round() as u64;
        let throughput = requests.value("rate").unwrap_or(0.0);

        // k6 reports the failure rate as a 0-1 fraction, independently of the
        // sample counts.
        let error_rate = summary
            .metrics
            .get("http_req_failed")
            .and_then(|metric| metric.value("value"))
            .unwrap_or(0.0)
            * 100.0;
        let successful_requests = ((total_requests as f64 * (1.0 - error_rate / 100.0))
            .round()
            .max(0.0) as u64)
            .min(total_requests);

        let fallback = K6Metric::default();
        let duration = summary
            .metrics
            .get("http_req_duration")
            .unwrap_or(&fallback);

        let mut custom_metrics = BTreeMap::new();
        if let Some(vus) = summary.metrics.get("vus").and_then(|metric| metric.value("max")) {
            custom_metrics.insert("vus_max".to_string(), json!(vus));
        }
        if let Some(iterations) = summary
            .metrics
            .get("iterations")
            .and_then(|metric| metric.value("count"))
        {
            custom_metrics.insert("iterations".to_string(), json!(iterations));
        }

        Ok(ScenarioMetrics {
            name: scenario_name.to_string(),
            kind: ScenarioKind::Load,
            started,
            ended,
            duration_seconds: (ended - started).num_seconds().max(0) as u64,
            total_requests,
            successful_requests,
            failed_requests: total_requests - successful_requests,
            error_rate,
            throughput,
            average_response_time: duration.value("avg").unwrap_or(0.0).round() as u64,
            minimum_response_time: duration.value("min").unwrap_or(0.0).round() as u64,
            maximum_response_time: duration.value("max").unwrap_or(0.0).round() as u64,
            p50_response_time: duration
                .value("med")
                .or_else(|| duration.value("p(50)"))
                .unwrap_or(0.0)
                .round() as u64,
            p95_response_time: duration.value("p(95)").unwrap_or(0.0).round() as u64,
            p99_response_time: duration.value("p(99)").unwrap_or(0.0).round() as u64,
            custom_metrics,
            results_file: Some(results_file.to_path_buf()),
            passed: false,
            failure_reason: None,
        })
    }
}

impl ScenarioExecutor for K6Runner {
    fn execute(
        &self,
        source: &Path,
        scenario_name: &str,
        _properties: &BTreeMap<String, String>,
    ) -> Result<ScenarioMetrics, GanderError> {
        let started = Utc::now();
        fs::create_dir_all(&self.report_directory)?;
        let results_file = self
            .report_directory
            .join(format!("{}_k6_results.json", scenario_name));
        let summary_file = self
            .report_directory
            .join(format!("{}_k6_summary.json", scenario_name));

        info!(
            "starting k6 scenario {} with script {}",
            scenario_name,
            source.display()
        );

        let output = Command::new(&self.binary)
            .arg("run")
            .arg("--out")
            .arg(format!("json={}", results_file.display()))
            .arg("--summary-export")
            .arg(&summary_file)
            .arg(source)
            .output()
            .map_err(|error| {
                if error.kind() == io::ErrorKind::NotFound {
                    GanderError::ToolNotFound {
                        tool: "k6".to_string(),
                        path: self.binary.clone(),
                    }
                } else {
                    GanderError::Executor {
                        scenario: scenario_name.to_string(),
                        detail: format!("failed to start k6: {}", error),
                    }
                }
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("k6: {}", line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!("k6: {}", line);
        }

        if !output.status.success() {
            return Err(GanderError::Executor {
                scenario: scenario_name.to_string(),
                detail: format!("k6 exited with {}", output.status),
            });
        }
        let ended = Utc::now();

        match K6Runner::parse_summary(&summary_file, scenario_name, started, ended, &results_file)
        {
            Ok(metrics) => {
                info!("k6 scenario completed: {}", scenario_name);
                Ok(metrics)
            }
            // Unusable summaries degrade to a failed record; the scenario
            // itself ran to completion.
            Err(error) => {
                warn!(
                    "failed to parse k6 summary for {}: {}",
                    scenario_name, error
                );
                Ok(ScenarioMetrics::empty(
                    scenario_name,
                    ScenarioKind::Load,
                    started,
                    ended,
                    &format!("Unreadable k6 summary: {}", error),
                ))
            }
        }
    }
}
